//! Bounded polling primitive shared by the confirmation waiter, the
//! block waiter and the streamer's live head-follow.

use std::future::Future;
use std::time::Duration;

use crate::error::StreamError;

/// Delay schedule between poll attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    /// Delay after the first unsuccessful attempt.
    pub initial: Duration,
    /// Cap on exponential growth.
    pub max: Duration,
    /// Growth factor per attempt; `1.0` gives a fixed delay.
    pub multiplier: f64,
}

impl Backoff {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial: delay,
            max: delay,
            multiplier: 1.0,
        }
    }

    pub fn exponential(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            initial,
            max,
            multiplier,
        }
    }

    /// Delay to wait after the `attempt`-th failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.initial.as_millis() as f64 * self.multiplier.powi(exp);
        let cap_ms = self.max.as_millis() as f64;
        Duration::from_millis(base_ms.min(cap_ms) as u64)
    }
}

/// How often and how long to poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Total attempts including the first; `None` polls forever.
    pub max_attempts: Option<u32>,
    pub backoff: Backoff,
}

impl PollPolicy {
    pub fn bounded(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            backoff,
        }
    }

    pub fn unbounded(backoff: Backoff) -> Self {
        Self {
            max_attempts: None,
            backoff,
        }
    }

    /// Returns `true` if another attempt is allowed after `attempt` attempts.
    pub fn allows_after(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }
}

/// Result of [`poll_until`] when the probe itself never failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    Exhausted { attempts: u32 },
}

/// Call `probe` until it yields `Some`, sleeping per `policy` in between.
///
/// `probe` receives the 1-based attempt number. An `Err` from the probe
/// aborts polling immediately; only `Ok(None)` is retried.
pub async fn poll_until<T, F, Fut>(policy: &PollPolicy, mut probe: F) -> Result<PollOutcome<T>, StreamError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, StreamError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        if let Some(value) = probe(attempt).await? {
            return Ok(PollOutcome::Ready(value));
        }
        if !policy.allows_after(attempt) {
            return Ok(PollOutcome::Exhausted { attempts: attempt });
        }
        let delay = policy.backoff.delay(attempt);
        tracing::trace!(attempt, delay_ms = delay.as_millis() as u64, "poll not ready");
        tokio::time::sleep(delay).await;
    }
}
