//! Configuration for a `Blockchain` instance.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::{Backoff, PollPolicy};

/// Which block the facade treats as "current".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainMode {
    /// The newest block the node has produced or received.
    #[default]
    Head,
    /// The newest block that can no longer be reverted.
    Irreversible,
}

impl std::fmt::Display for ChainMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Head => write!(f, "head"),
            Self::Irreversible => write!(f, "irreversible"),
        }
    }
}

impl std::str::FromStr for ChainMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "head" => Ok(Self::Head),
            "irreversible" => Ok(Self::Irreversible),
            other => Err(format!("unknown chain mode '{other}'")),
        }
    }
}

/// Streaming, estimation and waiting parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockchainConfig {
    pub mode: ChainMode,
    /// Nominal block interval (milliseconds). Used when the interval cannot
    /// be derived from the chain and as the default poll cadence.
    pub block_interval_ms: u64,
    /// Poll delay override (milliseconds). `None` = `block_interval_ms`.
    pub poll_interval_ms: Option<u64>,
    /// Poll attempts before `wait_for_and_get_block` gives up.
    pub max_block_wait_repetition: u32,
    /// Blocks fetched concurrently while catching up behind the head.
    pub batch_size: u64,
    /// Distance between head and the reference block used to derive the
    /// mean block interval.
    pub interval_sample_blocks: u64,
    /// Additive slack in the accurate estimator's probe budget.
    pub estimate_probe_slack: u64,
    /// Default poll attempts for transaction confirmation.
    pub confirmation_attempts: u32,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            mode: ChainMode::Head,
            block_interval_ms: 3000,
            poll_interval_ms: None,
            max_block_wait_repetition: 3,
            batch_size: 1,
            interval_sample_blocks: 100,
            estimate_probe_slack: 8,
            confirmation_attempts: 10,
        }
    }
}

impl BlockchainConfig {
    pub fn block_interval(&self) -> Duration {
        Duration::from_millis(self.block_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(self.block_interval_ms))
    }

    /// Fixed-delay policy bounded to `attempts`.
    pub fn bounded_poll(&self, attempts: u32) -> PollPolicy {
        PollPolicy::bounded(attempts.max(1), Backoff::fixed(self.poll_interval()))
    }

    /// Fixed-delay policy that never gives up (live head-follow).
    pub fn follow_poll(&self) -> PollPolicy {
        PollPolicy::unbounded(Backoff::fixed(self.poll_interval()))
    }
}
