//! Block-number estimation from a timestamp.
//!
//! A coarse estimate interpolates backwards from the head using the mean
//! block interval. An accurate estimate then probes real blocks: first by
//! jumping the remaining time error divided by the interval, then by single
//! steps until the timestamp boundary is crossed.
//!
//! The accurate search spends at most `2 * |first jump| + slack` probe RPCs,
//! where the first jump is the block offset implied by the first probe's
//! timestamp error. When the budget runs out the closest boundary seen so
//! far is returned.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BlockchainConfig;
use crate::error::StreamError;
use crate::node::{current_block_number, NodeClient};
use crate::streamer::fetch_block;

/// How hard to work on an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Precision {
    /// Interpolation only; typically within a few blocks.
    Coarse,
    /// Interpolation refined by probing actual block timestamps.
    #[default]
    Accurate,
}

/// Which side of the target time the accurate search settles on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    /// The first block with timestamp ≥ target.
    Forward,
    /// The last block with timestamp ≤ target.
    #[default]
    Backward,
}

/// Estimates the block produced at a given time.
pub struct BlockEstimator<'a, C: ?Sized> {
    node: &'a C,
    config: &'a BlockchainConfig,
}

impl<'a, C> BlockEstimator<'a, C>
where
    C: NodeClient + ?Sized,
{
    pub fn new(node: &'a C, config: &'a BlockchainConfig) -> Self {
        Self { node, config }
    }

    /// Timestamp of block `number`.
    pub async fn block_time(&self, number: u64) -> Result<DateTime<Utc>, StreamError> {
        let wait = self.config.bounded_poll(self.config.max_block_wait_repetition);
        Ok(fetch_block(self.node, number, &wait).await?.timestamp)
    }

    /// Mean seconds per block between the reference block and `head`.
    ///
    /// Falls back to the configured interval when the chain is too short or
    /// the timestamps do not advance.
    pub async fn block_interval(&self, head: u64, head_time: DateTime<Utc>) -> Result<f64, StreamError> {
        let fallback = self.config.block_interval_ms as f64 / 1000.0;
        let reference = head.saturating_sub(self.config.interval_sample_blocks).max(1);
        if reference >= head {
            return Ok(fallback);
        }
        let reference_time = self.block_time(reference).await?;
        let elapsed = (head_time - reference_time).num_milliseconds() as f64 / 1000.0;
        let interval = elapsed / (head - reference) as f64;
        if interval > 0.0 {
            Ok(interval)
        } else {
            tracing::warn!(head, reference, "non-advancing timestamps, using configured interval");
            Ok(fallback)
        }
    }

    /// Estimate the block number at `target`.
    pub async fn estimate(
        &self,
        target: DateTime<Utc>,
        direction: Direction,
        precision: Precision,
    ) -> Result<u64, StreamError> {
        let head = current_block_number(self.node, self.config.mode).await?;
        let head_time = self.block_time(head).await?;
        if target > head_time {
            return Ok(head);
        }

        let interval = self.block_interval(head, head_time).await?;
        let behind = (head_time - target).num_milliseconds() as f64 / 1000.0 / interval;
        let estimate = head.saturating_sub(behind.round() as u64).max(1);
        tracing::debug!(head, estimate, interval, "interpolated block estimate");

        match precision {
            Precision::Coarse => Ok(estimate),
            Precision::Accurate => {
                let mut probe = Probe {
                    estimator: self,
                    seen: HashMap::from([(head, head_time)]),
                    spent: 0,
                    budget: u64::MAX,
                };
                probe.refine(target, estimate, head, interval, direction).await
            }
        }
    }
}

/// Probe bookkeeping for one accurate search.
struct Probe<'e, 'a, C: ?Sized> {
    estimator: &'e BlockEstimator<'a, C>,
    seen: HashMap<u64, DateTime<Utc>>,
    spent: u64,
    budget: u64,
}

impl<C> Probe<'_, '_, C>
where
    C: NodeClient + ?Sized,
{
    /// Timestamp of `n`, or `None` once the budget is spent.
    async fn time(&mut self, n: u64) -> Result<Option<DateTime<Utc>>, StreamError> {
        if let Some(t) = self.seen.get(&n) {
            return Ok(Some(*t));
        }
        if self.spent >= self.budget {
            return Ok(None);
        }
        self.spent += 1;
        let t = self.estimator.block_time(n).await?;
        self.seen.insert(n, t);
        Ok(Some(t))
    }

    async fn refine(
        &mut self,
        target: DateTime<Utc>,
        estimate: u64,
        head: u64,
        interval: f64,
        direction: Direction,
    ) -> Result<u64, StreamError> {
        let jump_from = |t: DateTime<Utc>| -> i64 {
            ((target - t).num_milliseconds() as f64 / 1000.0 / interval).trunc() as i64
        };

        let mut b = estimate;
        let Some(t) = self.time(b).await? else {
            return Ok(b);
        };
        let mut jump = jump_from(t);
        self.budget = 2 * jump.unsigned_abs() + self.estimator.config.estimate_probe_slack;

        while jump != 0 {
            let next = (b as i64 + jump).clamp(1, head as i64) as u64;
            // Revisiting a probed block means the jumps oscillate; walk instead.
            if next == b || self.seen.contains_key(&next) {
                break;
            }
            b = next;
            match self.time(b).await? {
                Some(t) => jump = jump_from(t),
                None => return Ok(self.exhausted(b)),
            }
        }

        let Some(t) = self.time(b).await? else {
            return Ok(self.exhausted(b));
        };
        match direction {
            Direction::Forward if t >= target => {
                while b > 1 {
                    match self.time(b - 1).await? {
                        Some(prev) if prev >= target => b -= 1,
                        Some(_) => break,
                        None => return Ok(self.exhausted(b)),
                    }
                }
            }
            Direction::Forward => {
                while b < head {
                    b += 1;
                    match self.time(b).await? {
                        Some(t) if t >= target => break,
                        Some(_) => {}
                        None => return Ok(self.exhausted(b)),
                    }
                }
            }
            Direction::Backward if t <= target => {
                while b < head {
                    match self.time(b + 1).await? {
                        Some(next) if next <= target => b += 1,
                        Some(_) => break,
                        None => return Ok(self.exhausted(b)),
                    }
                }
            }
            Direction::Backward => {
                while b > 1 {
                    b -= 1;
                    match self.time(b).await? {
                        Some(t) if t <= target => break,
                        Some(_) => {}
                        None => return Ok(self.exhausted(b)),
                    }
                }
            }
        }
        tracing::debug!(block = b, probes = self.spent, "accurate block estimate");
        Ok(b)
    }

    fn exhausted(&self, b: u64) -> u64 {
        tracing::warn!(block = b, probes = self.spent, "estimate probe budget exhausted");
        b
    }
}
