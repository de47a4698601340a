//! Backoff between attempts.
//!
//! Used by non-ordered asynchronous sends, which are resent after a
//! retryable failure up to `retry_times_when_send_async_failed` times, and by
//! consumer lanes, which pause before redelivering a batch.
//!
//! Delays follow `initial_backoff * backoff_multiplier^n`, capped at
//! `max_backoff`. A multiplier of 1.0 gives a fixed delay.

use crate::error::{ClientError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one.
    pub max_retries: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(0, Duration::from_millis(100))
    }
}

impl RetryPolicy {
    pub fn new(
        max_retries: usize,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        }
    }

    /// Doubling delay starting at `initial`, capped at 30s.
    pub fn exponential(max_retries: usize, initial: Duration) -> Self {
        Self::new(max_retries, initial, Duration::from_secs(30), 2.0)
    }

    /// The same `delay` before every retry.
    pub fn fixed(max_retries: usize, delay: Duration) -> Self {
        Self::new(max_retries, delay, delay, 1.0)
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before retry `n`, counting from 0.
    pub fn backoff(&self, n: usize) -> Duration {
        let exponent = i32::try_from(n).unwrap_or(i32::MAX);
        let secs = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// [`backoff`](Self::backoff) spread by ±25%.
    pub fn jittered_backoff(&self, n: usize) -> Duration {
        self.backoff(n)
            .mul_f64(rand::thread_rng().gen_range(0.75..1.25))
    }
}

/// Await `operation` until it succeeds or returns an error that is not
/// retryable, or until `policy.max_retries` retries have been spent. The last
/// error is returned.
pub async fn retry_with_backoff<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retries = 0;

    loop {
        let err: ClientError = match operation().await {
            Ok(value) => {
                if retries > 0 {
                    debug!(retries, "Succeeded after retrying");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() || retries >= policy.max_retries {
            if retries > 0 {
                warn!(retries, error = %err, "Giving up");
            }
            return Err(err);
        }

        let delay = policy.jittered_backoff(retries);
        debug!(
            retry = retries + 1,
            max_retries = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transient failure, retrying"
        );
        sleep(delay).await;
        retries += 1;
    }
}
