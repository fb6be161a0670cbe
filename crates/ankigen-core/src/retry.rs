//! Bounded retry with exponential backoff.
//!
//! Both the attempt and the backoff sleep race against the root
//! [`CancellationToken`]; a cancellation wins over whatever error the last
//! attempt produced.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::Cancelled;

/// How many times to retry and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt, so `max_retries + 1` attempts in total.
    pub max_retries: u32,
    /// Wait after the first failed attempt; doubles after every further failure.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Wait before the attempt following failed attempt `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Run `op` until it succeeds or `policy.max_retries` retries are used up.
///
/// Returns the error of the final attempt on exhaustion, or `Cancelled`
/// converted into `E` as soon as `cancel` fires.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<Cancelled> + Display,
{
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(Cancelled.into());
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled.into()),
            outcome = op() => outcome,
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if attempt >= policy.max_retries {
            return Err(err);
        }

        let backoff = policy.backoff(attempt);
        log::debug!(
            "attempt {}/{} failed: {}; retrying in {:.1}s",
            attempt + 1,
            policy.max_retries + 1,
            err,
            backoff.as_secs_f64()
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled.into()),
            _ = tokio::time::sleep(backoff) => {}
        }
        attempt += 1;
    }
}
