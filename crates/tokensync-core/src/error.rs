//! Error types for the tokensync pipeline.

use thiserror::Error;

/// Errors raised by a key-value store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Batch of {len} items exceeds the limit of {max}")]
    BatchTooLarge { len: usize, max: usize },

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Item serialization error: {0}")]
    Serialization(String),
}

/// Errors that can occur while syncing a block.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Receipt not found for transaction {tx_hash}")]
    MissingReceipt { tx_hash: String },

    #[error("Metadata error for {address}: {reason}")]
    Metadata { address: String, reason: String },

    #[error("Malformed node payload: {0}")]
    Payload(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sync aborted at block {block_number}: {reason}")]
    Aborted { block_number: u64, reason: String },

    #[error("Sync cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Returns `true` if the error came from a shutdown request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
