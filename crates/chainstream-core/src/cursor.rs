//! Stream cursor — per-call traversal position and operation counters.

use std::collections::BTreeMap;

/// Position of one streaming call in the chain.
///
/// Created fresh by every `blocks` / `stream` / `ops_statistics` call and
/// dropped with it; never shared between calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCursor {
    /// Next block number to fetch.
    pub next: u64,
    /// Last block number to fetch (inclusive); `None` = follow the head.
    pub stop: Option<u64>,
    /// Highest block number the node reported at the last head query.
    pub known_head: u64,
    counters: BTreeMap<String, u64>,
}

impl StreamCursor {
    pub fn new(start: u64, stop: Option<u64>, known_head: u64) -> Self {
        Self {
            next: start,
            stop,
            known_head,
            counters: BTreeMap::new(),
        }
    }

    /// Mark `block_number` as delivered.
    pub fn advance(&mut self, block_number: u64) {
        self.next = block_number + 1;
    }

    /// Returns `true` once the stop block has been delivered.
    pub fn is_finished(&self) -> bool {
        self.stop.is_some_and(|stop| self.next > stop)
    }

    /// Returns `true` if the next block lies beyond the last known head.
    pub fn is_caught_up(&self) -> bool {
        self.next > self.known_head
    }

    /// Blocks that can be fetched right now without passing the head or
    /// the stop block, capped at `max`.
    pub fn available(&self, max: u64) -> u64 {
        if self.is_finished() || self.is_caught_up() {
            return 0;
        }
        let last = match self.stop {
            Some(stop) => stop.min(self.known_head),
            None => self.known_head,
        };
        (last - self.next + 1).min(max.max(1))
    }

    /// Count one operation of `op_type`.
    pub fn record(&mut self, op_type: &str) {
        *self.counters.entry(op_type.to_string()).or_insert(0) += 1;
    }

    /// Per-type operation counts seen so far.
    pub fn counts(&self) -> &BTreeMap<String, u64> {
        &self.counters
    }

    pub fn into_counts(self) -> BTreeMap<String, u64> {
        self.counters
    }

    /// Total operations counted.
    pub fn total(&self) -> u64 {
        self.counters.values().sum()
    }
}
