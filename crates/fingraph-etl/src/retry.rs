//! Run-level retry policy

use fingraph_config::RetryConfig;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::EtlError;

type Predicate = Arc<dyn Fn(&EtlError) -> bool + Send + Sync>;

/// Fixed-delay retry of a whole run: at most `max_attempts` attempts, `delay`
/// apart, and only for errors the predicate accepts.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    retryable: Predicate,
}

impl RetryPolicy {
    /// Retries transient errors ([`EtlError::is_transient`]).
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            retryable: Arc::new(EtlError::is_transient),
        }
    }

    /// A single attempt.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Replace the retryable-error predicate.
    pub fn with_predicate<F>(mut self, retryable: F) -> Self
    where
        F: Fn(&EtlError) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(retryable);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_retryable(&self, err: &EtlError) -> bool {
        (self.retryable)(err)
    }

    /// Whether attempt number `attempt` (1-based) failing with `err` earns
    /// another attempt.
    pub fn should_retry(&self, err: &EtlError, attempt: u32) -> bool {
        attempt < self.max_attempts && self.is_retryable(err)
    }

    /// Sleep out the delay. Returns `false` if `cancel` fired first.
    pub async fn pause(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.delay) => true,
            _ = cancel.cancelled() => false,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.delay())
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}
