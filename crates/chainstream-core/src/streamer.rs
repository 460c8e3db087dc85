//! The block streamer — lazy, pull-based block and operation sequences.
//!
//! # Traversal
//! 1. Resolve `start` / `stop` (`None` start = current block at call time).
//! 2. While behind the known head: fetch up to `batch_size` blocks, buffer,
//!    hand them out one per pull.
//! 3. Caught up and no stop reached: poll the head every poll interval
//!    until it moves past the cursor, then continue.
//!
//! Nothing runs in the background; dropping the stream drops any pending
//! RPC or sleep with it.

use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{self, Stream, TryStreamExt};

use crate::block::{Block, BlockCursor};
use crate::config::BlockchainConfig;
use crate::cursor::StreamCursor;
use crate::error::StreamError;
use crate::node::{current_block_number, NodeClient};
use crate::operation::{strip_suffix, OpShape, Operation, StreamedOp};
use crate::retry::{poll_until, PollOutcome, PollPolicy};

/// A lazy sequence of blocks.
pub type BlockStream<'a> = Pin<Box<dyn Stream<Item = Result<Block, StreamError>> + Send + 'a>>;

/// A lazy sequence of operations.
pub type OpStream<'a> = Pin<Box<dyn Stream<Item = Result<StreamedOp, StreamError>> + Send + 'a>>;

// ─── StreamOptions ────────────────────────────────────────────────────────────

/// Parameters of an operation stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamOptions {
    /// Only yield these operation types (empty = all).
    pub op_names: Vec<String>,
    /// First block (inclusive); `None` = current block at call time.
    pub start: Option<u64>,
    /// Last block (inclusive); `None` = follow the head forever.
    pub stop: Option<u64>,
    /// Render operations as `[type, value]` pairs.
    pub raw_ops: bool,
    /// Omit the enclosing transaction from yielded operations.
    pub only_ops: bool,
}

impl StreamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to the given operation types. A trailing `_operation` is
    /// ignored, so `"vote"` and `"vote_operation"` are equivalent.
    pub fn op_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.op_names = names
            .into_iter()
            .map(|n| Operation::new(n, serde_json::Value::Null).op_type)
            .collect();
        self
    }

    pub fn start(mut self, block: u64) -> Self {
        self.start = Some(block);
        self
    }

    pub fn stop(mut self, block: u64) -> Self {
        self.stop = Some(block);
        self
    }

    /// Closed range `[start, stop]`.
    pub fn range(self, start: u64, stop: u64) -> Self {
        self.start(start).stop(stop)
    }

    pub fn raw_ops(mut self, raw: bool) -> Self {
        self.raw_ops = raw;
        self
    }

    pub fn only_ops(mut self, only: bool) -> Self {
        self.only_ops = only;
        self
    }

    /// Returns `true` if `op_type` passes the type filter. The
    /// `_operation` suffix is ignored on both sides.
    pub fn matches(&self, op_type: &str) -> bool {
        let op_type = strip_suffix(op_type);
        self.op_names.is_empty() || self.op_names.iter().any(|n| strip_suffix(n) == op_type)
    }

    fn shape(&self) -> OpShape {
        if self.raw_ops {
            OpShape::Raw
        } else {
            OpShape::Flat
        }
    }
}

// ─── BlockStreamer ────────────────────────────────────────────────────────────

/// Produces block and operation streams from a [`NodeClient`].
pub struct BlockStreamer<'a, C: ?Sized> {
    node: &'a C,
    config: &'a BlockchainConfig,
}

impl<'a, C> BlockStreamer<'a, C>
where
    C: NodeClient + ?Sized,
{
    pub fn new(node: &'a C, config: &'a BlockchainConfig) -> Self {
        Self { node, config }
    }

    /// Blocks `[start, stop]` in strictly increasing order.
    pub fn blocks(&self, start: Option<u64>, stop: Option<u64>) -> BlockStream<'a> {
        let state = Traversal::new(self.node, self.config, start, stop);
        Box::pin(stream::try_unfold(state, |mut state| async move {
            let block = state.next_block().await?;
            Ok(block.map(|b| (b, state)))
        }))
    }

    /// Operations from `blocks(opts.start, opts.stop)` passing the filter.
    pub fn stream(&self, opts: StreamOptions) -> OpStream<'a> {
        let blocks = self.blocks(opts.start, opts.stop);
        Box::pin(
            blocks
                .map_ok(move |block| stream::iter(expand(&block, &opts).into_iter().map(Ok::<_, StreamError>)))
                .try_flatten(),
        )
    }

    /// Exact per-type operation counts over `[start, stop]`.
    pub async fn ops_statistics(&self, start: u64, stop: u64) -> Result<BTreeMap<String, u64>, StreamError> {
        let mut state = Traversal::new(self.node, self.config, Some(start), Some(stop));
        while let Some(block) = state.next_block().await? {
            state.record(&block);
        }
        let counts = state.into_counts();
        tracing::info!(start, stop, total = counts.values().sum::<u64>(), "ops statistics complete");
        Ok(counts)
    }
}

/// Flatten one block into the operations `opts` selects.
fn expand(block: &Block, opts: &StreamOptions) -> Vec<StreamedOp> {
    let mut out = Vec::new();
    for tx in &block.transactions {
        let mut context: Option<Arc<_>> = None;
        for (i, op) in tx.operations.iter().enumerate() {
            if !opts.matches(&op.op_type) {
                continue;
            }
            let transaction = if opts.only_ops {
                None
            } else {
                Some(context.get_or_insert_with(|| Arc::new(tx.clone())).clone())
            };
            out.push(StreamedOp {
                block_num: block.number,
                timestamp: block.timestamp,
                trx_id: tx.id.clone(),
                trx_in_block: tx.index,
                op_in_trx: i as u32,
                id: op.hash(),
                op: op.clone(),
                transaction,
                shape: opts.shape(),
            });
        }
    }
    out
}

// ─── Traversal ────────────────────────────────────────────────────────────────

/// State behind one `blocks` call.
struct Traversal<'a, C: ?Sized> {
    node: &'a C,
    config: &'a BlockchainConfig,
    start: Option<u64>,
    stop: Option<u64>,
    cursor: Option<StreamCursor>,
    buffered: VecDeque<Block>,
}

impl<'a, C> Traversal<'a, C>
where
    C: NodeClient + ?Sized,
{
    fn new(node: &'a C, config: &'a BlockchainConfig, start: Option<u64>, stop: Option<u64>) -> Self {
        Self {
            node,
            config,
            start,
            stop,
            cursor: None,
            buffered: VecDeque::new(),
        }
    }

    async fn next_block(&mut self) -> Result<Option<Block>, StreamError> {
        if let Some(block) = self.buffered.pop_front() {
            return Ok(Some(block));
        }
        let mut cursor = match self.cursor.take() {
            Some(cursor) => cursor,
            None => self.open().await?,
        };
        let filled = fill(self.node, self.config, &mut cursor, &mut self.buffered).await;
        self.cursor = Some(cursor);
        filled?;
        Ok(self.buffered.pop_front())
    }

    async fn open(&self) -> Result<StreamCursor, StreamError> {
        let head = current_block_number(self.node, self.config.mode).await?;
        let start = self.start.unwrap_or(head);
        if let Some(stop) = self.stop {
            if start > stop {
                return Err(StreamError::InvalidRange { start, stop });
            }
        }
        tracing::debug!(start, stop = ?self.stop, head, mode = %self.config.mode, "opening block stream");
        Ok(StreamCursor::new(start, self.stop, head))
    }

    fn record(&mut self, block: &Block) {
        if let Some(cursor) = self.cursor.as_mut() {
            for (_, _, op) in block.operations() {
                cursor.record(&op.op_type);
            }
        }
    }

    fn into_counts(self) -> BTreeMap<String, u64> {
        self.cursor.map(StreamCursor::into_counts).unwrap_or_default()
    }
}

/// Buffer the next run of blocks, waiting for the head if caught up.
async fn fill<C>(
    node: &C,
    config: &BlockchainConfig,
    cursor: &mut StreamCursor,
    buffered: &mut VecDeque<Block>,
) -> Result<(), StreamError>
where
    C: NodeClient + ?Sized,
{
    if cursor.is_finished() {
        return Ok(());
    }
    if cursor.is_caught_up() {
        let target = cursor.next;
        let mode = config.mode;
        match poll_until(&config.follow_poll(), |_| async move {
            let head = current_block_number(node, mode).await?;
            Ok((head >= target).then_some(head))
        })
        .await?
        {
            PollOutcome::Ready(head) => cursor.known_head = head,
            PollOutcome::Exhausted { attempts } => {
                return Err(StreamError::BlockWaitTimeout {
                    block_num: target,
                    attempts,
                })
            }
        }
    }

    let count = cursor.available(config.batch_size);
    let first = cursor.next;
    let wait = config.bounded_poll(config.max_block_wait_repetition);
    let blocks = if count <= 1 {
        vec![fetch_block(node, first, &wait).await?]
    } else {
        futures::future::try_join_all((first..first + count).map(|n| fetch_block(node, n, &wait))).await?
    };

    for block in blocks {
        tracing::debug!(block = block.number, txs = block.transactions.len(), "block fetched");
        cursor.advance(block.number);
        buffered.push_back(block);
    }
    Ok(())
}

/// Fetch and normalize block `number`, re-polling while the node reports
/// it as not yet available.
pub(crate) async fn fetch_block<C>(node: &C, number: u64, wait: &PollPolicy) -> Result<Block, StreamError>
where
    C: NodeClient + ?Sized,
{
    match poll_until(wait, |_| node.get_block(number)).await? {
        PollOutcome::Ready(raw) => BlockCursor::normalize(&raw),
        PollOutcome::Exhausted { attempts } => Err(StreamError::BlockWaitTimeout {
            block_num: number,
            attempts,
        }),
    }
}
