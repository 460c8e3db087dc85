//! Error types for the streaming layer.

use thiserror::Error;

/// Errors surfaced by block streaming, estimation and confirmation waiting.
///
/// Every variant aborts the current call or lazy sequence; nothing is
/// skipped silently.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Malformed block {block_num}: {reason}")]
    MalformedBlock { block_num: u64, reason: String },

    #[error("Transaction not confirmed after {attempts} attempts")]
    ConfirmationTimeout { attempts: u32 },

    #[error("Block {block_num} did not appear after {attempts} attempts")]
    BlockWaitTimeout { block_num: u64, attempts: u32 },

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Invalid block range: start {start} > stop {stop}")]
    InvalidRange { start: u64, stop: u64 },

    #[error("{0}")]
    Other(String),
}

impl StreamError {
    /// Returns `true` if a bounded wait ran out of attempts.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConfirmationTimeout { .. } | Self::BlockWaitTimeout { .. }
        )
    }

    /// Returns `true` if retrying the same call cannot succeed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::MalformedBlock { .. } | Self::InvalidTransaction(_) | Self::InvalidRange { .. }
        )
    }
}
