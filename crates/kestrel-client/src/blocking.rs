//! Blocking reads over any [`QueueClient`].
//!
//! [`Blocking::get`] keeps reading until an item arrives, pausing between
//! empty reads as the [`WaitPolicy`] says. Waits can be bounded by a
//! deadline or cut short with a [`CancellationToken`].

use crate::client::QueueClient;
use crate::command::ReadOptions;
use crate::error::{QueueError, TransportError};
use crate::random::{RandomSource, StdRandom};
use crate::stats::QueueStats;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "blocking_tests.rs"]
mod tests;

/// Backoff bases in seconds, indexed by the number of empty reads so far
const BACKOFF_SECONDS: [f64; 8] = [0.0, 0.01, 0.01, 0.1, 0.1, 0.5, 0.5, 1.0];

/// How long to pause after an empty read
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    /// Growing pauses from 10ms to 1s, with jitter
    #[default]
    Backoff,

    /// The same pause after every empty read
    Fixed(Duration),

    /// Read again right away `immediate` times, then pause `delay` each time
    ImmediateThenFixed { immediate: u32, delay: Duration },

    /// Let the server hold each read open for up to `timeout_ms`
    ServerWait { timeout_ms: u64 },
}

impl WaitPolicy {
    /// Pause after the `empty_reads`-th consecutive empty read
    pub fn delay(&self, empty_reads: u32, random: &mut dyn RandomSource) -> Duration {
        match self {
            Self::Backoff => {
                let last = BACKOFF_SECONDS[BACKOFF_SECONDS.len() - 1];
                let base = BACKOFF_SECONDS
                    .get(empty_reads as usize)
                    .copied()
                    .unwrap_or(last);
                Duration::from_secs_f64((random.next_f64() * base + base) / 2.0)
            }
            Self::Fixed(delay) => *delay,
            Self::ImmediateThenFixed { immediate, delay } => {
                if empty_reads <= *immediate {
                    Duration::ZERO
                } else {
                    *delay
                }
            }
            Self::ServerWait { .. } => Duration::ZERO,
        }
    }

    /// Options for each underlying read
    pub fn read_options(&self, options: &ReadOptions) -> ReadOptions {
        match self {
            Self::ServerWait { timeout_ms } if options.timeout.is_none() => {
                options.clone().with_timeout(*timeout_ms)
            }
            _ => options.clone(),
        }
    }
}

/// Wrapper turning empty reads into waits
pub struct Blocking<C> {
    inner: C,
    policy: WaitPolicy,
    random: Box<dyn RandomSource>,
}

impl<C: QueueClient> Blocking<C> {
    /// Wrap `inner` with the default backoff
    pub fn new(inner: C) -> Self {
        Self::with_policy(inner, WaitPolicy::default())
    }

    pub fn with_policy(inner: C, policy: WaitPolicy) -> Self {
        Self {
            inner,
            policy,
            random: Box::new(StdRandom::new()),
        }
    }

    /// Replace the random source used for backoff jitter
    pub fn with_random(mut self, random: Box<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn policy(&self) -> &WaitPolicy {
        &self.policy
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    /// Read from `key`, waiting as long as it takes for an item
    pub async fn get(&mut self, key: &str, options: &ReadOptions) -> Result<Bytes, QueueError> {
        loop {
            if let Some(value) = self.poll(key, options, None, None).await? {
                return Ok(value);
            }
        }
    }

    /// A single read that returns immediately, empty or not
    pub async fn get_without_blocking(
        &mut self,
        key: &str,
        options: &ReadOptions,
    ) -> Result<Option<Bytes>, QueueError> {
        self.inner.get(key, options).await
    }

    /// Wait for an item until `cancel` fires. Cancellation yields `None`.
    pub async fn get_with_cancel(
        &mut self,
        key: &str,
        options: &ReadOptions,
        cancel: &CancellationToken,
    ) -> Result<Option<Bytes>, QueueError> {
        self.poll(key, options, Some(cancel), None).await
    }

    /// Wait for an item until `deadline`. Running out of time yields `None`.
    pub async fn get_until(
        &mut self,
        key: &str,
        options: &ReadOptions,
        deadline: Instant,
    ) -> Result<Option<Bytes>, QueueError> {
        self.poll(key, options, None, Some(deadline)).await
    }

    /// Write `value`, trying once more after a generic transport failure
    pub async fn set(&mut self, key: &str, value: Bytes, expiry: u32) -> Result<bool, QueueError> {
        match self.inner.set(key, value.clone(), expiry).await {
            Err(QueueError::Transport(error @ TransportError::Failure { .. })) => {
                warn!(key = %key, error = %error, "Retrying write once after failure");
                self.inner.set(key, value, expiry).await
            }
            result => result,
        }
    }

    async fn poll(
        &mut self,
        key: &str,
        options: &ReadOptions,
        cancel: Option<&CancellationToken>,
        deadline: Option<Instant>,
    ) -> Result<Option<Bytes>, QueueError> {
        let options = self.policy.read_options(options);
        let mut empty_reads = 0u32;

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                debug!(key = %key, "Blocking read cancelled");
                return Ok(None);
            }

            if let Some(value) = self.inner.get(key, &options).await? {
                return Ok(Some(value));
            }

            empty_reads = empty_reads.saturating_add(1);
            let mut delay = self.policy.delay(empty_reads, self.random.as_mut());

            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    debug!(key = %key, empty_reads, "Blocking read reached its deadline");
                    return Ok(None);
                }
                delay = delay.min(deadline - now);
            }

            match cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            debug!(key = %key, "Blocking read cancelled");
                            return Ok(None);
                        }
                        _ = pause(delay) => {}
                    }
                }
                None => pause(delay).await,
            }
        }
    }
}

/// Sleep for `delay`, or just yield to the scheduler when it is zero
async fn pause(delay: Duration) {
    if delay.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl<C: QueueClient> QueueClient for Blocking<C> {
    async fn get(
        &mut self,
        key: &str,
        options: &ReadOptions,
    ) -> Result<Option<Bytes>, QueueError> {
        Blocking::get(self, key, options).await.map(Some)
    }

    async fn set(&mut self, key: &str, value: Bytes, expiry: u32) -> Result<bool, QueueError> {
        Blocking::set(self, key, value, expiry).await
    }

    async fn delete(&mut self, key: &str) -> Result<(), QueueError> {
        self.inner.delete(key).await
    }

    async fn flush(&mut self, key: &str) -> Result<u64, QueueError> {
        self.inner.flush(key).await
    }

    async fn stat(&mut self, key: &str) -> Result<Option<QueueStats>, QueueError> {
        self.inner.stat(key).await
    }
}
