//! In-memory node used by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chainstream_core::{BlockchainConfig, NodeClient, RawBlock, StreamError, TransactionRef, TxStatus};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

pub const GENESIS_UNIX: i64 = 1_520_000_000;

/// A synthetic chain.
///
/// `head` is what the node reports as current; blocks up to `available`
/// can be served. With `advance_on_query`, every head query moves the head
/// one block forward (up to `available`), imitating block production.
pub struct MockNode {
    blocks: Mutex<BTreeMap<u64, Value>>,
    head: AtomicU64,
    irreversible: AtomicU64,
    available: AtomicU64,
    advance_on_query: AtomicBool,
    statuses: Mutex<HashMap<String, VecDeque<TxStatus>>>,
    failing_block: AtomicU64,
    fail_head: AtomicBool,
    fail_status: AtomicBool,
    pub status_calls: AtomicU32,
    pub block_calls: AtomicU32,
}

impl MockNode {
    pub fn new() -> Self {
        Self {
            blocks: Mutex::new(BTreeMap::new()),
            head: AtomicU64::new(0),
            irreversible: AtomicU64::new(0),
            available: AtomicU64::new(0),
            advance_on_query: AtomicBool::new(false),
            statuses: Mutex::new(HashMap::new()),
            failing_block: AtomicU64::new(0),
            fail_head: AtomicBool::new(false),
            fail_status: AtomicBool::new(false),
            status_calls: AtomicU32::new(0),
            block_calls: AtomicU32::new(0),
        }
    }

    /// Blocks `first..=last`, three seconds apart, each holding one
    /// transfer and one vote. Even blocks use the tagged-pair encoding, odd
    /// blocks the named-record encoding.
    pub fn transfer_vote_chain(first: u64, last: u64) -> Self {
        let node = Self::new();
        for n in first..=last {
            node.insert(n, block_body(n, time_of(n, 3), transfer_and_vote(n)));
        }
        node.set_head(last);
        node
    }

    /// Blocks `1..=last` where every `skip_every`-th slot is missed, so the
    /// gap before such a block is six seconds instead of three.
    pub fn irregular_chain(last: u64, skip_every: u64) -> Self {
        let node = Self::new();
        let mut t = GENESIS_UNIX;
        for n in 1..=last {
            if n > 1 {
                t += if n % skip_every == 0 { 6 } else { 3 };
            }
            let ts = DateTime::from_timestamp(t, 0).unwrap();
            node.insert(n, block_body(n, ts, vec![]));
        }
        node.set_head(last);
        node
    }

    pub fn insert(&self, n: u64, body: Value) {
        self.blocks.lock().unwrap().insert(n, body);
        self.available.fetch_max(n, Ordering::SeqCst);
    }

    pub fn set_head(&self, n: u64) {
        self.head.store(n, Ordering::SeqCst);
        self.irreversible.store(n.saturating_sub(20), Ordering::SeqCst);
    }

    pub fn set_irreversible(&self, n: u64) {
        self.irreversible.store(n, Ordering::SeqCst);
    }

    pub fn advance_on_query(&self, on: bool) {
        self.advance_on_query.store(on, Ordering::SeqCst);
    }

    /// Make every fetch of block `n` fail with an RPC error.
    pub fn fail_block(&self, n: u64) {
        self.failing_block.store(n, Ordering::SeqCst);
    }

    /// Make head queries fail with an RPC error.
    pub fn fail_head(&self, on: bool) {
        self.fail_head.store(on, Ordering::SeqCst);
    }

    /// Make transaction status lookups fail with an RPC error.
    pub fn fail_status(&self, on: bool) {
        self.fail_status.store(on, Ordering::SeqCst);
    }

    pub fn head(&self) -> u64 {
        self.head.load(Ordering::SeqCst)
    }

    /// Queue the statuses successive lookups of `id` return; the last one
    /// repeats.
    pub fn script_status(&self, id: &str, statuses: Vec<TxStatus>) {
        self.statuses.lock().unwrap().insert(id.to_string(), statuses.into());
    }

    pub fn block_time(&self, n: u64) -> DateTime<Utc> {
        let blocks = self.blocks.lock().unwrap();
        let ts = blocks[&n]["timestamp"].as_str().unwrap().to_string();
        chainstream_core::block::parse_time(&ts).unwrap()
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn get_block(&self, number: u64) -> Result<Option<RawBlock>, StreamError> {
        self.block_calls.fetch_add(1, Ordering::SeqCst);
        if number == self.failing_block.load(Ordering::SeqCst) {
            return Err(StreamError::Rpc(format!("connection reset fetching block {number}")));
        }
        if number > self.head.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let blocks = self.blocks.lock().unwrap();
        Ok(blocks.get(&number).map(|body| RawBlock::new(number, body.clone())))
    }

    async fn get_current_block_number(&self) -> Result<u64, StreamError> {
        if self.fail_head.load(Ordering::SeqCst) {
            return Err(StreamError::Rpc("node unreachable".into()));
        }
        if self.advance_on_query.load(Ordering::SeqCst) {
            let available = self.available.load(Ordering::SeqCst);
            let head = self.head.load(Ordering::SeqCst);
            if head < available {
                self.set_head(head + 1);
            }
        }
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn get_last_irreversible_block_number(&self) -> Result<u64, StreamError> {
        Ok(self.irreversible.load(Ordering::SeqCst))
    }

    async fn get_transaction_status(&self, tx: &TransactionRef) -> Result<TxStatus, StreamError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(StreamError::Rpc("Internal Error: database lock timeout".into()));
        }
        let key = tx.id.clone().unwrap_or_else(|| tx.signatures.join(","));
        let mut statuses = self.statuses.lock().unwrap();
        let Some(queue) = statuses.get_mut(&key) else {
            return Ok(TxStatus::NotFound);
        };
        let status = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap_or(TxStatus::NotFound)
        };
        Ok(status)
    }
}

/// Millisecond polling so live-follow tests run fast.
pub fn fast_config() -> BlockchainConfig {
    BlockchainConfig {
        poll_interval_ms: Some(1),
        ..Default::default()
    }
}

pub fn time_of(n: u64, interval: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(GENESIS_UNIX, 0).unwrap() + Duration::seconds(interval * (n as i64 - 1))
}

pub fn transfer_and_vote(n: u64) -> Vec<Value> {
    transfer_and_vote_shaped(n, n % 2 == 0)
}

/// One transfer and one vote, as tagged pairs or as named records.
pub fn transfer_and_vote_shaped(n: u64, pairs: bool) -> Vec<Value> {
    let transfer = json!({"from": "alice", "to": "bob", "amount": format!("{n}.000 STEEM"), "memo": ""});
    let vote = json!({"voter": "carol", "author": "dave", "permlink": format!("post-{n}"), "weight": 10000});
    if pairs {
        vec![json!(["transfer", transfer]), json!(["vote", vote])]
    } else {
        vec![
            json!({"type": "transfer_operation", "value": transfer}),
            json!({"type": "vote_operation", "value": vote}),
        ]
    }
}

/// One transaction per operation.
pub fn block_body(n: u64, time: DateTime<Utc>, ops: Vec<Value>) -> Value {
    let txs: Vec<Value> = ops
        .into_iter()
        .map(|op| json!({"operations": [op], "signatures": [format!("{n:04x}")], "expiration": "2030-01-01T00:00:00"}))
        .collect();
    let ids: Vec<String> = (0..txs.len()).map(|i| format!("{n:036x}{i:04x}")).collect();
    json!({
        "timestamp": time.format("%Y-%m-%dT%H:%M:%S").to_string(),
        "witness": "init-miner",
        "transactions": txs,
        "transaction_ids": ids,
    })
}
