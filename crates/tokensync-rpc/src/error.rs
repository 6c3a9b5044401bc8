//! Transport-level error types.

use thiserror::Error;

use crate::request::JsonRpcError;

/// JSON-RPC error code nodes use for oversized or failed log queries.
pub const QUERY_TOO_LARGE_CODE: i64 = -32000;

/// Errors that can occur during an RPC transport operation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, timeout, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The node answered with a payload of the wrong shape.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// An unexpected error.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` if this error is retryable (transient).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Timeout { .. })
    }

    /// Returns `true` if this is a node-side execution error (not retryable).
    pub fn is_execution_error(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }

    /// Returns `true` if the node rejected a log query as too large.
    pub fn is_query_too_large(&self) -> bool {
        matches!(self, Self::Rpc(e) if e.code == QUERY_TOO_LARGE_CODE)
    }
}
