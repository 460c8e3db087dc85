//! Transport-level error types.

use chainstream_core::StreamError;
use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors that can occur while talking to a node.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, reset, bad status, …).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Timeout { .. })
    }
}

impl From<TransportError> for StreamError {
    fn from(e: TransportError) -> Self {
        StreamError::Rpc(e.to_string())
    }
}
