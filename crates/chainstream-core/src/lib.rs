//! chainstream-core — block streaming and confirmation tracking for
//! delegated-proof-of-stake chains.
//!
//! # Architecture
//!
//! ```text
//! Blockchain<C: NodeClient>
//!      ├── BlockStreamer      (blocks / stream / ops_statistics, live head-follow)
//!      │        └── BlockCursor (raw block → canonical Block / Operation)
//!      ├── BlockEstimator     (timestamp → block number)
//!      ├── ConfirmationWaiter (transaction inclusion polling)
//!      └── poll_until         (bounded retry shared by all of the above)
//! ```
//!
//! Every component takes its [`NodeClient`] explicitly; there is no shared
//! default connection.

pub mod block;
pub mod blockchain;
pub mod config;
pub mod cursor;
pub mod error;
pub mod estimator;
pub mod node;
pub mod operation;
pub mod retry;
pub mod streamer;
pub mod waiter;

pub use block::{Block, BlockCursor, RawBlock, Transaction};
pub use blockchain::Blockchain;
pub use config::{BlockchainConfig, ChainMode};
pub use cursor::StreamCursor;
pub use error::StreamError;
pub use estimator::{BlockEstimator, Direction, Precision};
pub use node::{current_block_number, NodeClient, TransactionRef, TxStatus};
pub use operation::{hash_op, OpShape, Operation, StreamedOp};
pub use retry::{poll_until, Backoff, PollOutcome, PollPolicy};
pub use streamer::{BlockStream, BlockStreamer, OpStream, StreamOptions};
pub use waiter::{wait_for_and_get_block, ConfirmationState, ConfirmationWaiter};
