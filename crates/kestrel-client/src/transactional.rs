//! # Transactional Reads
//!
//! At-least-once job delivery on top of a [`Client`], or any wrapper over it
//! that implements [`TransactionClient`].
//!
//! Every queue `q` is paired with an error queue `q_errors`. A read opens a
//! server-side transaction on whichever of the two produced the job. The
//! transaction is closed when the consumer asks for the next job (or calls
//! [`Transactional::commit`]), which removes the job for good. A consumer
//! that fails a job calls [`Transactional::retry`], which writes the job to
//! the error queue with its retry count raised and closes the original
//! transaction. A job that fails `max_retries` times is dropped.
//!
//! A consumer that crashes with a transaction open leaves the job on the
//! server, which hands it out again once the transaction is released.
//!
//! Only one queue may have an open transaction per instance. Reading a
//! different queue while a job is open fails with
//! [`QueueError::MultipleQueues`] and touches no server.

use crate::client::{Client, QueueClient, TransactionClient};
use crate::command::{error_queue, validate_key, ReadOptions, VERB_DELIMITER};
use crate::config::TransactionalConfig;
use crate::error::QueueError;
use crate::job::RetryableJob;
use crate::random::{RandomSource, StdRandom};
use crate::stats::QueueStats;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "transactional_tests.rs"]
mod tests;

/// The job handed out by the last successful read
#[derive(Debug, Clone)]
struct OpenJob {
    queue: String,
    /// Queue holding the server-side transaction, primary or error
    source: String,
    job: RetryableJob,
}

/// Transactional job reader for a single consumer
///
/// # Examples
///
/// ```rust
/// use kestrel_client::{Client, ClientConfig, InMemoryTransport, ReadOptions, Transactional};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let transport = InMemoryTransport::new(1);
/// transport.enqueue(0, "jobs", "resize image 42");
///
/// let client = Client::new(Arc::new(transport.clone()), &ClientConfig::default());
/// let mut jobs = Transactional::new(client);
///
/// let job = jobs.get("jobs", &ReadOptions::new()).await.unwrap();
/// assert_eq!(job.as_deref(), Some(&b"resize image 42"[..]));
/// assert_eq!(jobs.current_try(), 1);
/// # });
/// ```
pub struct Transactional<C = Client> {
    client: C,
    config: TransactionalConfig,
    random: Box<dyn RandomSource>,
    open: Option<OpenJob>,
    last_read_queue: Option<String>,
}

impl<C: TransactionClient> Transactional<C> {
    /// Wrap `client` with default retry settings
    pub fn new(client: C) -> Self {
        Self::with_config(client, TransactionalConfig::default())
    }

    pub fn with_config(client: C, config: TransactionalConfig) -> Self {
        Self {
            client,
            config,
            random: Box::new(StdRandom::new()),
            open: None,
            last_read_queue: None,
        }
    }

    /// Replace the random source deciding when the error queue is read first
    pub fn with_random(mut self, random: Box<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn config(&self) -> &TransactionalConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    pub fn into_inner(self) -> C {
        self.client
    }

    /// Queue with an open transaction, if any
    pub fn current_queue(&self) -> Option<&str> {
        self.open.as_ref().map(|open| open.queue.as_str())
    }

    /// Job handed out by the open transaction, if any
    pub fn current_job(&self) -> Option<&RetryableJob> {
        self.open.as_ref().map(|open| &open.job)
    }

    /// Queue (primary or error) the last job was actually read from
    pub fn last_read_queue(&self) -> Option<&str> {
        self.last_read_queue.as_deref()
    }

    /// Attempt number of the job in flight, 1 when there is none
    pub fn current_try(&self) -> u32 {
        self.open
            .as_ref()
            .map(|open| open.job.current_try())
            .unwrap_or(1)
    }

    /// Read the next job from `key` or its error queue.
    ///
    /// A job still open on `key` is closed first, which acknowledges it.
    /// Returns the job payload, or `None` when both queues are empty.
    pub async fn get(
        &mut self,
        key: &str,
        options: &ReadOptions,
    ) -> Result<Option<Bytes>, QueueError> {
        validate_key(key)?;

        if let Some(open) = &self.open {
            if open.queue != key {
                return Err(QueueError::MultipleQueues {
                    open: open.queue.clone(),
                    requested: key.to_string(),
                });
            }
        }

        self.close_open_job().await?;

        let primary = key.to_string();
        let errors = error_queue(key);
        let (first, second) = if self.random.next_f64() < self.config.error_rate {
            (errors, primary)
        } else {
            (primary, errors)
        };

        let read = ReadOptions {
            open: true,
            close: false,
            abort: false,
            peek: false,
            ..options.clone()
        };

        let found = match self.client.get(&first, &read).await? {
            Some(value) => Some((first, value)),
            None => self
                .client
                .get(&second, &read)
                .await?
                .map(|value| (second, value)),
        };

        let Some((source, value)) = found else {
            self.last_read_queue = None;
            return Ok(None);
        };

        let job = RetryableJob::decode(value);
        let payload = job.payload().clone();
        debug!(
            queue = %key,
            source = %source,
            retries = job.retries(),
            "Opened job"
        );

        self.last_read_queue = Some(source.clone());
        self.open = Some(OpenJob {
            queue: key.to_string(),
            source,
            job,
        });

        Ok(Some(payload))
    }

    /// Put the open job back on the error queue for another attempt.
    ///
    /// `replacement` swaps in a new payload while keeping the retry count.
    /// Returns `true` when the job was re-enqueued and `false` when its retry
    /// budget is spent and it was dropped. The transaction is closed either
    /// way.
    ///
    /// Without an open job this fails with [`QueueError::NoOpenTransaction`],
    /// or returns `false` when the layer is not strict.
    pub async fn retry(&mut self, replacement: Option<Bytes>) -> Result<bool, QueueError> {
        let Some(open) = self.open.take() else {
            return self.no_open_transaction();
        };

        let next = match replacement {
            Some(payload) => open.job.retry_with(payload),
            None => open.job.next_retry(),
        };
        let errors = error_queue(&open.queue);

        let requeued = if next.retries() < self.config.max_retries {
            self.client.set(&errors, next.encode()?, 0).await?
        } else {
            warn!(
                queue = %open.queue,
                retries = next.retries(),
                max_retries = self.config.max_retries,
                "Dropping job after exhausting retries"
            );
            false
        };

        self.close_transaction(&open.source).await?;

        debug!(
            queue = %open.queue,
            retries = next.retries(),
            requeued,
            "Retried job"
        );
        Ok(requeued)
    }

    /// Close the open transaction now instead of on the next `get`.
    ///
    /// Returns `false` when nothing was open.
    pub async fn commit(&mut self) -> Result<bool, QueueError> {
        self.close_open_job().await
    }

    /// Release the open transaction without acknowledging the job.
    ///
    /// The server hands the job out again. Returns `false` when nothing was
    /// open and the layer is not strict.
    pub async fn abort(&mut self) -> Result<bool, QueueError> {
        let Some(open) = self.open.take() else {
            return self.no_open_transaction();
        };

        self.last_read_queue = None;

        debug!(queue = %open.source, "Aborting job");
        self.client
            .get_from_last(&format!("{}{}abort", open.source, VERB_DELIMITER))
            .await?;
        Ok(true)
    }

    fn no_open_transaction(&self) -> Result<bool, QueueError> {
        if self.config.strict {
            Err(QueueError::NoOpenTransaction)
        } else {
            Ok(false)
        }
    }

    /// Close the job left open by the previous read, if any.
    ///
    /// The state is cleared before the close is sent, so a failed close does
    /// not leave a stale job behind.
    async fn close_open_job(&mut self) -> Result<bool, QueueError> {
        let Some(open) = self.open.take() else {
            return Ok(false);
        };

        self.close_transaction(&open.source).await?;
        Ok(true)
    }

    async fn close_transaction(&mut self, queue: &str) -> Result<(), QueueError> {
        self.client
            .get_from_last(&format!("{}{}close", queue, VERB_DELIMITER))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl<C: TransactionClient> QueueClient for Transactional<C> {
    async fn get(
        &mut self,
        key: &str,
        options: &ReadOptions,
    ) -> Result<Option<Bytes>, QueueError> {
        Transactional::get(self, key, options).await
    }

    async fn set(&mut self, key: &str, value: Bytes, expiry: u32) -> Result<bool, QueueError> {
        self.client.set(key, value, expiry).await
    }

    async fn delete(&mut self, key: &str) -> Result<(), QueueError> {
        self.client.delete(key).await
    }

    async fn flush(&mut self, key: &str) -> Result<u64, QueueError> {
        self.client.flush(key).await
    }

    async fn stat(&mut self, key: &str) -> Result<Option<QueueStats>, QueueError> {
        self.client.stat(key).await
    }
}
