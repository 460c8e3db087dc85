//! Bounded waits: transaction confirmation and target-block arrival.

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::config::BlockchainConfig;
use crate::error::StreamError;
use crate::node::{current_block_number, NodeClient, TransactionRef, TxStatus};
use crate::retry::{poll_until, PollOutcome};
use crate::streamer::fetch_block;

/// Lifecycle of one confirmation wait.
///
/// `Polling` is initial; the other states are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationState {
    Polling,
    Confirmed { block_num: u64 },
    TimedOut { attempts: u32 },
    Invalid { reason: String },
}

impl ConfirmationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Polling)
    }

    /// Map a terminal state to the caller-facing result.
    pub fn into_result(self) -> Result<u64, StreamError> {
        match self {
            Self::Confirmed { block_num } => Ok(block_num),
            Self::TimedOut { attempts } => Err(StreamError::ConfirmationTimeout { attempts }),
            Self::Invalid { reason } => Err(StreamError::InvalidTransaction(reason)),
            Self::Polling => Err(StreamError::Other("confirmation wait still polling".into())),
        }
    }
}

impl std::fmt::Display for ConfirmationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Polling => write!(f, "polling"),
            Self::Confirmed { block_num } => write!(f, "confirmed in block {block_num}"),
            Self::TimedOut { attempts } => write!(f, "timed out after {attempts} attempts"),
            Self::Invalid { reason } => write!(f, "invalid: {reason}"),
        }
    }
}

/// Polls a node until a transaction is included.
pub struct ConfirmationWaiter<'a, C: ?Sized> {
    node: &'a C,
    config: &'a BlockchainConfig,
}

impl<'a, C> ConfirmationWaiter<'a, C>
where
    C: NodeClient + ?Sized,
{
    pub fn new(node: &'a C, config: &'a BlockchainConfig) -> Self {
        Self { node, config }
    }

    /// Run one wait to a terminal state.
    ///
    /// `NotFound` is retried up to `max_attempts` polls; `Invalid` ends the
    /// wait on the first poll. Node errors propagate as `Err`.
    pub async fn run(&self, tx: &TransactionRef, max_attempts: u32) -> Result<ConfirmationState, StreamError> {
        let policy = self.config.bounded_poll(max_attempts);
        let node = self.node;
        let outcome = poll_until(&policy, |attempt| async move {
            match node.get_transaction_status(tx).await? {
                TxStatus::Confirmed { block_num } => Ok(Some(ConfirmationState::Confirmed { block_num })),
                TxStatus::Invalid { reason } => Ok(Some(ConfirmationState::Invalid { reason })),
                TxStatus::NotFound => {
                    tracing::debug!(attempt, id = ?tx.id, "transaction not yet included");
                    Ok(None)
                }
            }
        })
        .await?;

        let state = match outcome {
            PollOutcome::Ready(state) => state,
            PollOutcome::Exhausted { attempts } => ConfirmationState::TimedOut { attempts },
        };
        tracing::info!(id = ?tx.id, %state, "confirmation wait finished");
        Ok(state)
    }

    /// Block number that confirmed `tx`.
    pub async fn await_transaction(&self, tx: &TransactionRef, max_attempts: u32) -> Result<u64, StreamError> {
        self.run(tx, max_attempts).await?.into_result()
    }
}

/// Wait until the node's current block reaches `target`, then return
/// block `target` itself.
pub async fn wait_for_and_get_block<C>(
    node: &C,
    config: &BlockchainConfig,
    target: u64,
    max_repetitions: u32,
) -> Result<Block, StreamError>
where
    C: NodeClient + ?Sized,
{
    let policy = config.bounded_poll(max_repetitions);
    let mode = config.mode;
    let reached = poll_until(&policy, |attempt| async move {
        let current = current_block_number(node, mode).await?;
        tracing::trace!(attempt, current, target, "waiting for block");
        Ok((current >= target).then_some(current))
    })
    .await?;

    match reached {
        PollOutcome::Ready(_) => fetch_block(node, target, &policy).await,
        PollOutcome::Exhausted { attempts } => Err(StreamError::BlockWaitTimeout {
            block_num: target,
            attempts,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!ConfirmationState::Polling.is_terminal());
        assert!(ConfirmationState::Confirmed { block_num: 1 }.is_terminal());
        assert!(ConfirmationState::TimedOut { attempts: 3 }.is_terminal());
    }

    #[test]
    fn state_into_result() {
        assert_eq!(ConfirmationState::Confirmed { block_num: 9 }.into_result().unwrap(), 9);
        assert!(matches!(
            ConfirmationState::TimedOut { attempts: 3 }.into_result(),
            Err(StreamError::ConfirmationTimeout { attempts: 3 })
        ));
        assert!(matches!(
            ConfirmationState::Invalid { reason: "bad".into() }.into_result(),
            Err(StreamError::InvalidTransaction(_))
        ));
    }
}
