//! Exponential backoff for transient transport failures.
//!
//! This covers a single request (connection resets, timeouts). Node-side
//! errors are never retried here; the sync stages decide what to do with them.

use std::time::Duration;

/// Configuration for the retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting the first try).
    pub max_retries: u32,
    pub initial_backoff: Duration,
    /// Caps exponential growth.
    pub max_backoff: Duration,
    /// Factor applied to the backoff on each retry.
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            multiplier: 2,
        }
    }
}

/// Stateless retry policy: computes the next delay given the attempt number.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the delay before the `attempt`-th retry (1-based), or `None`
    /// once `max_retries` is exhausted.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.config.max_retries {
            return None;
        }
        let factor = self.config.multiplier.saturating_pow(attempt - 1);
        let delay = self.config.initial_backoff.saturating_mul(factor);
        Some(delay.min(self.config.max_backoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_until_exhausted() {
        let policy = RetryPolicy::new(RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            multiplier: 2,
        });
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(3), Some(Duration::from_millis(400)));
        assert!(policy.next_delay(4).is_none());
    }

    #[test]
    fn delay_capped_at_max() {
        let policy = RetryPolicy::new(RetryConfig {
            max_retries: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            multiplier: 10,
        });
        assert_eq!(policy.next_delay(5), Some(Duration::from_millis(500)));
    }
}
