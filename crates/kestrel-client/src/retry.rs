//! # Retry Policy Module
//!
//! Bounded retries for mutating queue operations (`set`, `delete`).
//!
//! Only failures in the recoverable set (see
//! [`TransportError::is_recoverable`]) are retried. Anything else propagates on
//! the first attempt.

use crate::error::TransportError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;

/// Default number of additional attempts after a recoverable failure
pub const DEFAULT_EXCEPTION_RETRY_LIMIT: u32 = 5;

/// Result of a write run under a [`RetryPolicy`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome<T> {
    /// The operation returned a value
    Completed(T),
    /// The transport reported "operation now in progress". Treated as done.
    InProgress,
}

impl<T> WriteOutcome<T> {
    /// Value of a completed write, if any
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::InProgress => None,
        }
    }
}

/// Retry policy for writes
///
/// # Examples
///
/// ```rust
/// use kestrel_client::retry::RetryPolicy;
///
/// // 1 initial attempt + 5 retries
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.total_attempts(), 6);
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first recoverable failure
    pub exception_retry_limit: u32,

    /// Pause between attempts
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_EXCEPTION_RETRY_LIMIT)
    }
}

impl RetryPolicy {
    /// Create a policy allowing `exception_retry_limit` retries
    pub fn new(exception_retry_limit: u32) -> Self {
        Self {
            exception_retry_limit,
            retry_delay: Duration::ZERO,
        }
    }

    /// Pause for `delay` between attempts
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Total number of attempts (initial + retries)
    pub fn total_attempts(&self) -> u32 {
        self.exception_retry_limit + 1
    }

    /// Run `operation`, retrying recoverable failures.
    ///
    /// The "operation now in progress" system error ends the run as
    /// [`WriteOutcome::InProgress`] without consuming a retry. Once the budget
    /// is exhausted the last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<WriteOutcome<T>, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut tries_left = self.total_attempts();

        loop {
            match operation().await {
                Ok(value) => return Ok(WriteOutcome::Completed(value)),
                Err(error) if error.is_operation_in_progress() => {
                    debug!(error = %error, "Ignoring in-progress connect on write");
                    return Ok(WriteOutcome::InProgress);
                }
                Err(error) if error.is_recoverable() => {
                    tries_left -= 1;
                    if tries_left == 0 {
                        warn!(
                            error = %error,
                            attempts = self.total_attempts(),
                            "Write failed after exhausting retries"
                        );
                        return Err(error);
                    }

                    warn!(
                        error = %error,
                        tries_left = tries_left,
                        "Retrying write after recoverable failure"
                    );

                    if !self.retry_delay.is_zero() {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
                Err(error) => return Err(error),
            }
        }
    }
}
