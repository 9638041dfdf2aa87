//! Retry-on-contention for store operations
//!
//! Every store operation runs inside [`with_retry`]: the operation future
//! acquires its pooled connection, does its work and drops the connection on
//! every exit path. Contention errors re-run the whole operation after a
//! delay; anything else is returned immediately.

use super::StoreError;
use crate::config::{RetryBackoff, StorageConfig};
use crate::telemetry::{increment_counter, CounterMetric};
use std::future::Future;
use std::time::Duration;

/// Bounded retry policy for storage contention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one (at least 1)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub delay: Duration,
    pub backoff: RetryBackoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration, backoff: RetryBackoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff,
        }
    }

    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, RetryBackoff::Fixed)
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(
            config.retry_count,
            Duration::from_millis(config.retry_delay_ms),
            config.retry_backoff,
        )
    }

    /// Delay to sleep after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            RetryBackoff::Fixed => self.delay,
            RetryBackoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(factor)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1), RetryBackoff::Fixed)
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy runs out of attempts.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                if attempt >= policy.max_attempts {
                    tracing::error!(
                        operation,
                        attempts = attempt,
                        error = %err,
                        "Storage contention persisted, giving up"
                    );
                    return Err(err.into_exhausted(attempt));
                }

                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Storage busy, retrying"
                );
                increment_counter(CounterMetric::StoreRetries, 1);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
