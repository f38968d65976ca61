//! Bounded retry around the write path.
//!
//! The policy is deliberately small: one retry after a fixed delay, and only
//! for network problems. A batch that fails twice is dropped so the test run
//! keeps going with a gap in the uploaded series.

use crate::error::{Result, UploaderError};
use crate::serializer::TimeSeriesRecord;
use crate::session::MetricsStore;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// What happened to a batch handed to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written, on the first or second attempt.
    Delivered { attempts: u32 },
    /// Both attempts hit a network problem; the batch is gone.
    Dropped,
    /// The store refused the batch; not retried.
    Rejected,
}

impl SendOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SendOutcome::Delivered { .. })
    }
}

/// Single-shot, fixed-delay retry policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `attempt`, retrying it once after `delay` on a network problem.
    ///
    /// Network and remote failures are contained and reported through the
    /// returned outcome. Any other error is returned as-is.
    pub async fn run<F, Fut>(&self, mut attempt: F) -> Result<SendOutcome>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        match attempt().await {
            Ok(()) => return Ok(SendOutcome::Delivered { attempts: 1 }),
            Err(e) if e.is_network_problem() => {
                debug!("Error sending data: {}", e);
                warn!(
                    "Failed to send data, will retry in {} sec...",
                    self.delay.as_secs_f64()
                );
            }
            Err(e) => return settle(e),
        }

        sleep(self.delay).await;

        match attempt().await {
            Ok(()) => {
                info!("Succeeded with retry");
                Ok(SendOutcome::Delivered { attempts: 2 })
            }
            Err(e) if e.is_network_problem() => {
                error!("Fatal error sending data: {}", e);
                warn!("Will skip failed data and continue running");
                Ok(SendOutcome::Dropped)
            }
            Err(e) => settle(e),
        }
    }
}

fn settle(err: UploaderError) -> Result<SendOutcome> {
    match err {
        UploaderError::Remote { .. } => {
            error!("Data rejected by metrics store: {}", err);
            Ok(SendOutcome::Rejected)
        }
        other => Err(other),
    }
}

/// A metrics store wrapped with the retry policy.
pub struct RetrySender<S> {
    store: S,
    policy: RetryPolicy,
}

impl<S: MetricsStore> RetrySender<S> {
    pub fn new(store: S, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn send(&self, records: &[TimeSeriesRecord]) -> Result<SendOutcome> {
        debug!(
            "Sending {} records to {}",
            records.len(),
            self.store.name()
        );
        self.policy.run(|| self.store.write(records)).await
    }
}
