//! Sync cursor: tracks the next block to process.

use serde::{Deserialize, Serialize};

/// The driver's position in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Next block to process.
    pub block_number: u64,
}

impl Cursor {
    pub fn new(block_number: u64) -> Self {
        Self { block_number }
    }

    /// Compute the resume point from the configured start block and the
    /// persisted watermark.
    ///
    /// The result is `max(start_block, watermark + 1)`. With neither
    /// available, syncing starts at the current chain head.
    pub fn resume(start_block: Option<u64>, watermark: Option<u64>, head: u64) -> Self {
        let after_watermark = watermark.map(|w| w + 1);
        let block_number = match (start_block, after_watermark) {
            (Some(s), Some(w)) => s.max(w),
            (Some(s), None) => s,
            (None, Some(w)) => w,
            (None, None) => head,
        };
        Self { block_number }
    }

    /// Returns `true` when the resume point needs the chain head.
    pub fn needs_head(start_block: Option<u64>, watermark: Option<u64>) -> bool {
        start_block.is_none() && watermark.is_none()
    }

    pub fn current(&self) -> u64 {
        self.block_number
    }

    /// Move to the next block.
    pub fn advance(&mut self) {
        self.block_number += 1;
    }
}
