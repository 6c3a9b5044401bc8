//! Pacing controller: adjusts the delay between blocks.
//!
//! When the pipeline falls behind real time (`slow`) the delay shrinks so the
//! driver catches up; when it keeps pace the delay grows so it polls the
//! head less aggressively. The interval is always clamped to
//! `[floor, ceiling]`.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::PacingConfig;

/// Additive-increase / additive-decrease delay controller.
#[derive(Debug, Clone)]
pub struct PacingController {
    config: PacingConfig,
    interval: Duration,
}

impl PacingController {
    pub fn new(config: PacingConfig) -> Self {
        // an inverted range settles on the ceiling
        let interval = config.baseline.max(config.floor).min(config.ceiling);
        Self { config, interval }
    }

    /// Current delay between blocks.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Feed the result of the last block and return the new interval.
    pub fn record(&mut self, slow: bool) -> Duration {
        self.interval = if slow {
            self.interval
                .saturating_sub(self.config.step)
                .max(self.config.floor)
        } else {
            self.interval
                .saturating_add(self.config.step)
                .min(self.config.ceiling)
        };
        self.interval
    }
}

impl Default for PacingController {
    fn default() -> Self {
        Self::new(PacingConfig::default())
    }
}

/// Tracks the gap between wall-clock time and processed block time.
///
/// A block is `slow` when its gap is larger than the previous block's gap.
/// The first observation is never slow.
#[derive(Debug, Clone, Default)]
pub struct LagTracker {
    previous_ms: Option<i64>,
}

impl LagTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a processed block timestamp (seconds) against `now`.
    pub fn observe_at(&mut self, block_timestamp: i64, now: DateTime<Utc>) -> bool {
        let diff_ms = now.timestamp_millis() - block_timestamp.saturating_mul(1000);
        let slow = self.previous_ms.is_some_and(|prev| diff_ms > prev);
        self.previous_ms = Some(diff_ms);
        slow
    }

    /// Record a processed block timestamp against the current time.
    pub fn observe(&mut self, block_timestamp: i64) -> bool {
        self.observe_at(block_timestamp, Utc::now())
    }

    /// Last recorded gap in milliseconds.
    pub fn last_lag_ms(&self) -> Option<i64> {
        self.previous_ms
    }
}
