use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::{batch::Batch, error::SinkError, sink::Sink};

/// Bounded exponential backoff around a sink.
///
/// Retrying means a batch may be committed more than once if the sink
/// failed after storing it, so it is opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of delivery attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: Duration::from_secs(30),
        }
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Delay before the given retry. The first retry is number 1.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// A sink that retries failed deliveries before giving up.
pub struct RetryingSink<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: Sink> RetryingSink<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<S: Sink> Sink for RetryingSink<S> {
    async fn deliver(&self, batch: &Batch) -> Result<(), SinkError> {
        let mut attempt = 1;

        loop {
            let err = match self.inner.deliver(batch).await {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            if attempt >= self.policy.max_attempts {
                return Err(SinkError::RetriesExhausted {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let backoff = self.policy.backoff(attempt);
            warn!(
                worker = %batch.worker(),
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "batch delivery failed. Retrying."
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}
