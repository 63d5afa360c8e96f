//! Fixed-delay retry policy
//!
//! A policy never computes backoff: every retry waits the same `delay`.

use crate::config::RetryConfig;
use crate::error::{IsRetryable, TaskFault};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub type RetryPredicate = Arc<dyn Fn(&TaskFault) -> bool + Send + Sync>;

/// Decides whether a failed attempt is repeated.
///
/// `max_retries` counts total attempts, so a policy with `max_retries = 1`
/// runs exactly once.
#[derive(Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    delay: Duration,
    predicate: RetryPredicate,
}

impl RetryPolicy {
    pub fn new<F>(max_retries: u32, delay: Duration, predicate: F) -> Self
    where
        F: Fn(&TaskFault) -> bool + Send + Sync + 'static,
    {
        let max_retries = if max_retries == 0 {
            warn!("Retry policy created with max_retries = 0, using 1");
            1
        } else {
            max_retries
        };
        Self {
            max_retries,
            delay,
            predicate: Arc::new(predicate),
        }
    }

    /// One attempt, and the predicate vetoes any retry
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, |_| false)
    }

    /// Retries faults classified as transient
    pub fn transient(max_retries: u32, delay: Duration) -> Self {
        Self::new(max_retries, delay, |fault| fault.is_retryable())
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::transient(config.max_retries, config.delay())
    }

    /// Writes are only repeated when the statement is safe to apply twice
    pub fn for_write(config: &RetryConfig, idempotent: bool) -> Self {
        Self::new(config.max_retries, config.delay(), move |fault| {
            idempotent && fault.is_retryable()
        })
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Only asked while there is retry budget left
    pub fn should_retry(&self, fault: &TaskFault) -> bool {
        (self.predicate)(fault)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::no_retry()
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}
