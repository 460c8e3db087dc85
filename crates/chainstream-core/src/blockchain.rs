//! `Blockchain` — the facade over streaming, estimation and waiting.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::block::{Block, BlockCursor};
use crate::config::BlockchainConfig;
use crate::error::StreamError;
use crate::estimator::{BlockEstimator, Direction, Precision};
use crate::node::{current_block_number, NodeClient, TransactionRef};
use crate::operation::hash_op;
use crate::retry::PollPolicy;
use crate::streamer::{fetch_block, BlockStream, BlockStreamer, OpStream, StreamOptions};
use crate::waiter::{wait_for_and_get_block, ConfirmationWaiter};

/// Chain access for one node connection.
///
/// The node client is always passed in; wrap it in an `Arc` to share one
/// connection between several facades.
///
/// ```rust,ignore
/// let chain = Blockchain::new(client, BlockchainConfig::default());
/// let mut ops = chain.stream(StreamOptions::new().op_names(["transfer"]).range(100, 200));
/// while let Some(op) = ops.try_next().await? {
///     println!("{} in block {}", op.op_type(), op.block_num);
/// }
/// ```
pub struct Blockchain<C> {
    node: C,
    config: BlockchainConfig,
}

impl<C: NodeClient> Blockchain<C> {
    pub fn new(node: C, config: BlockchainConfig) -> Self {
        Self { node, config }
    }

    pub fn node(&self) -> &C {
        &self.node
    }

    pub fn config(&self) -> &BlockchainConfig {
        &self.config
    }

    /// Current block number per the configured mode. Never cached.
    pub async fn get_current_block_num(&self) -> Result<u64, StreamError> {
        current_block_number(&self.node, self.config.mode).await
    }

    /// The current block, normalized.
    pub async fn get_current_block(&self) -> Result<Block, StreamError> {
        let num = self.get_current_block_num().await?;
        fetch_block(&self.node, num, &self.block_wait()).await
    }

    /// Block `num`, or `None` if the node does not have it.
    pub async fn get_block(&self, num: u64) -> Result<Option<Block>, StreamError> {
        match self.node.get_block(num).await? {
            Some(raw) => BlockCursor::normalize(&raw).map(Some),
            None => Ok(None),
        }
    }

    pub async fn block_time(&self, num: u64) -> Result<DateTime<Utc>, StreamError> {
        self.estimator().block_time(num).await
    }

    /// Block time as Unix seconds.
    pub async fn block_timestamp(&self, num: u64) -> Result<i64, StreamError> {
        Ok(fetch_block(&self.node, num, &self.block_wait()).await?.unix_timestamp())
    }

    /// Mean block interval derived from recent blocks.
    pub async fn block_interval(&self) -> Result<Duration, StreamError> {
        let head = self.get_current_block_num().await?;
        let estimator = self.estimator();
        let head_time = estimator.block_time(head).await?;
        let secs = estimator.block_interval(head, head_time).await?;
        Ok(Duration::from_secs_f64(secs))
    }

    /// Block number produced at `time`.
    pub async fn get_estimated_block_num(
        &self,
        time: DateTime<Utc>,
        direction: Direction,
        precision: Precision,
    ) -> Result<u64, StreamError> {
        self.estimator().estimate(time, direction, precision).await
    }

    /// Blocks `[start, stop]`; `None` start = current block, `None` stop =
    /// follow the head forever.
    pub fn blocks(&self, start: Option<u64>, stop: Option<u64>) -> BlockStream<'_> {
        self.streamer().blocks(start, stop)
    }

    /// Operations matching `opts`.
    pub fn stream(&self, opts: StreamOptions) -> OpStream<'_> {
        self.streamer().stream(opts)
    }

    /// Every operation in `[start, stop]`, without transaction context.
    pub fn ops(&self, start: Option<u64>, stop: Option<u64>) -> OpStream<'_> {
        let opts = StreamOptions {
            start,
            stop,
            only_ops: true,
            ..StreamOptions::default()
        };
        self.streamer().stream(opts)
    }

    /// Exact per-type operation counts over `[start, stop]`.
    pub async fn ops_statistics(&self, start: u64, stop: u64) -> Result<BTreeMap<String, u64>, StreamError> {
        self.streamer().ops_statistics(start, stop).await
    }

    /// Canonical hash of an operation in either wire shape.
    pub fn hash_op(&self, op: &Value) -> Result<String, StreamError> {
        hash_op(op)
    }

    /// Wait for a signed transaction to be included; returns its block.
    ///
    /// Structurally invalid transactions fail before any poll.
    pub async fn await_transaction(&self, tx: &Value, max_attempts: Option<u32>) -> Result<u64, StreamError> {
        let tx = TransactionRef::from_value(tx)?;
        self.await_transaction_ref(&tx, max_attempts).await
    }

    pub async fn await_transaction_ref(
        &self,
        tx: &TransactionRef,
        max_attempts: Option<u32>,
    ) -> Result<u64, StreamError> {
        let attempts = max_attempts.unwrap_or(self.config.confirmation_attempts);
        ConfirmationWaiter::new(&self.node, &self.config)
            .await_transaction(tx, attempts)
            .await
    }

    /// Wait until block `num` exists and return it.
    pub async fn wait_for_and_get_block(&self, num: u64, max_repetitions: Option<u32>) -> Result<Block, StreamError> {
        let reps = max_repetitions.unwrap_or(self.config.max_block_wait_repetition);
        wait_for_and_get_block(&self.node, &self.config, num, reps).await
    }

    fn streamer(&self) -> BlockStreamer<'_, C> {
        BlockStreamer::new(&self.node, &self.config)
    }

    fn estimator(&self) -> BlockEstimator<'_, C> {
        BlockEstimator::new(&self.node, &self.config)
    }

    fn block_wait(&self) -> PollPolicy {
        self.config.bounded_poll(self.config.max_block_wait_repetition)
    }
}
