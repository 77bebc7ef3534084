use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use crate::RelayError;
use crate::store::RecordStore;

/// Policy controlling how many times a transient failure is retried and how
/// long to wait between attempts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of additional attempts after the first failure.
    pub max_retries: usize,
    /// Delay before the first retry, in milliseconds.
    pub delay_ms: u64,
    /// Upper bound for the doubled delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_ms: 200,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, delay: Duration) -> Self {
        let delay_ms = delay.as_millis() as u64;
        Self {
            max_retries,
            delay_ms,
            max_delay_ms: delay_ms.saturating_mul(8),
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (starting at 1).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }

    /// Execute `op`, retrying while `should_retry` accepts the error.
    pub async fn retry_if<F, Fut, T, E, P>(&self, mut op: F, should_retry: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempts < self.max_retries && should_retry(&e) => {
                    attempts += 1;
                    let delay = self.delay_for(attempts);
                    warn!(error = %e, attempt = attempts, ?delay, "retrying after failure");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Execute `op`, retrying transient [`RelayError`]s.
    pub async fn retry<F, Fut, T>(&self, op: F) -> Result<T, RelayError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, RelayError>>,
    {
        self.retry_if(op, RelayError::is_transient).await
    }
}

/// Wrapper around a [`RecordStore`] that retries transient failures.
pub struct RetryRecords<R> {
    inner: R,
    policy: RetryPolicy,
}

impl<R> RetryRecords<R> {
    pub fn new(inner: R, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<R> RecordStore for RetryRecords<R>
where
    R: RecordStore,
{
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RelayError> {
        self.policy.retry(|| self.inner.get(key)).await
    }

    async fn put(&self, key: &str, body: &[u8]) -> Result<(), RelayError> {
        self.policy.retry(|| self.inner.put(key, body)).await
    }

    async fn list(&self) -> Result<Vec<String>, RelayError> {
        self.policy.retry(|| self.inner.list()).await
    }
}
