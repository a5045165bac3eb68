//! # Queue Client
//!
//! [`Client`] is the per-consumer entry point. It owns the sticky routing
//! state and the random source, and talks to the servers through a shared
//! [`Transport`].
//!
//! Reads stick to one server for up to `gets_per_server` consecutive reads
//! of the same queue. Writes go to a random server and run under the
//! client's [`RetryPolicy`]. A dead or slow server never fails a read; it
//! reads as empty so the consumer moves on.
//!
//! [`QueueClient`] is the operation set shared by the client and every
//! wrapper layered over it, so wrappers compose in any order.

use crate::command::{validate_key, ReadOptions};
use crate::config::ClientConfig;
use crate::error::{ConfigurationError, QueueError, TransportError};
use crate::random::{RandomSource, StdRandom};
use crate::retry::{RetryPolicy, WriteOutcome};
use crate::router::{ReadRoute, StickyRouter};
use crate::stats::{QueueStats, ServerStats};
use crate::transport::Transport;
use crate::transports::TcpTransport;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

// ============================================================================
// QueueClient Trait
// ============================================================================

/// Operations shared by the client and the wrappers built on it
#[async_trait]
pub trait QueueClient: Send {
    /// Read one item from `key`, or `None` when the queue is empty
    async fn get(&mut self, key: &str, options: &ReadOptions)
        -> Result<Option<Bytes>, QueueError>;

    /// Append `value` to `key`. Returns `false` when the server refused it.
    async fn set(&mut self, key: &str, value: Bytes, expiry: u32) -> Result<bool, QueueError>;

    /// Delete the queue `key`
    async fn delete(&mut self, key: &str) -> Result<(), QueueError>;

    /// Drain `key`, returning the number of items discarded
    async fn flush(&mut self, key: &str) -> Result<u64, QueueError>;

    /// Statistics of `key` merged across servers
    async fn stat(&mut self, key: &str) -> Result<Option<QueueStats>, QueueError>;
}

/// Clients that can finish a reliable read.
///
/// A transaction opened by a read can only be closed or aborted on the server
/// that handed out the item, so wrappers forward these commands to it
/// unchanged apart from their own key mapping.
#[async_trait]
pub trait TransactionClient: QueueClient {
    /// Send an encoded key such as `jobs/close` to the server of the last read
    async fn get_from_last(&mut self, wire_key: &str) -> Result<Option<Bytes>, QueueError>;
}

#[async_trait]
impl<C: QueueClient + ?Sized> QueueClient for &mut C {
    async fn get(
        &mut self,
        key: &str,
        options: &ReadOptions,
    ) -> Result<Option<Bytes>, QueueError> {
        (**self).get(key, options).await
    }

    async fn set(&mut self, key: &str, value: Bytes, expiry: u32) -> Result<bool, QueueError> {
        (**self).set(key, value, expiry).await
    }

    async fn delete(&mut self, key: &str) -> Result<(), QueueError> {
        (**self).delete(key).await
    }

    async fn flush(&mut self, key: &str) -> Result<u64, QueueError> {
        (**self).flush(key).await
    }

    async fn stat(&mut self, key: &str) -> Result<Option<QueueStats>, QueueError> {
        (**self).stat(key).await
    }
}

// ============================================================================
// Client
// ============================================================================

/// Queue client for a single consumer
pub struct Client {
    transport: Arc<dyn Transport>,
    router: StickyRouter,
    retry_policy: RetryPolicy,
    default_get_timeout: Option<u64>,
    random: Box<dyn RandomSource>,
}

impl Client {
    /// Create a client over `transport` with the settings in `config`.
    ///
    /// The server list in `config` is ignored; the transport decides which
    /// servers exist.
    pub fn new(transport: Arc<dyn Transport>, config: &ClientConfig) -> Self {
        Self {
            transport,
            router: StickyRouter::new(config.gets_per_server),
            retry_policy: RetryPolicy::new(config.exception_retry_limit),
            default_get_timeout: config.default_get_timeout(),
            random: Box::new(StdRandom::new()),
        }
    }

    /// Create a client connected over TCP to the servers in `config`
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;

        info!(
            servers = ?config.servers,
            gets_per_server = config.gets_per_server,
            "Creating queue client"
        );

        let transport = TcpTransport::new(
            config.servers.clone(),
            config.io_timeout(),
            config.dead_timeout(),
        );
        Ok(Self::new(Arc::new(transport), config))
    }

    /// Replace the random source used for server selection
    pub fn with_random(mut self, random: Box<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Replace the retry policy applied to writes
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn router(&self) -> &StickyRouter {
        &self.router
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Server-side wait applied to reads without an explicit timeout
    pub fn default_get_timeout(&self) -> Option<u64> {
        self.default_get_timeout
    }

    fn random_server(&mut self) -> Result<usize, TransportError> {
        match self.transport.server_count() {
            0 => Err(TransportError::NoServers),
            count => Ok(self.random.next_index(count)),
        }
    }

    fn read_server(&mut self, route: ReadRoute) -> Result<usize, TransportError> {
        let server = match (route, self.router.last_server()) {
            (ReadRoute::Sticky, Some(server)) if server < self.transport.server_count() => server,
            _ => self.random_server()?,
        };
        self.router.set_last_server(server);
        Ok(server)
    }

    /// Read one item from `key`.
    ///
    /// Unreachable or slow servers read as empty. An empty read sends the
    /// next read to a random server.
    #[instrument(skip(self, options))]
    pub async fn get(
        &mut self,
        key: &str,
        options: &ReadOptions,
    ) -> Result<Option<Bytes>, QueueError> {
        validate_key(key)?;
        let wire_key = options.encode_key(key, self.default_get_timeout);

        let route = self.router.select(key);
        let server = self.read_server(route)?;

        let value = match self.transport.get(server, &wire_key).await {
            Ok(value) => value,
            Err(error) if error.is_absorbed_on_read() => {
                debug!(
                    server = %self.transport.server_name(server),
                    error = %error,
                    "Treating failed read as empty"
                );
                None
            }
            Err(error) => return Err(error.into()),
        };

        if value.is_none() {
            self.router.record_empty();
        }

        Ok(value)
    }

    /// Send an already encoded key to the server that served the last read.
    ///
    /// Used to close or abort a reliable read, which only the server holding
    /// the transaction can do. Without a previous read a random server is
    /// used. Errors are returned unchanged.
    pub async fn get_from_last(&mut self, wire_key: &str) -> Result<Option<Bytes>, QueueError> {
        let server = match self.router.last_server() {
            Some(server) if server < self.transport.server_count() => server,
            _ => {
                let server = self.random_server()?;
                self.router.set_last_server(server);
                server
            }
        };

        debug!(
            server = %self.transport.server_name(server),
            key = %wire_key,
            "Sending command to last server"
        );
        Ok(self.transport.get(server, wire_key).await?)
    }

    /// Return the head of `key` without removing it
    pub async fn peek(&mut self, key: &str) -> Result<Option<Bytes>, QueueError> {
        self.get(key, &ReadOptions::new().peek()).await
    }

    /// Append `value` to `key` on a random server.
    ///
    /// Each attempt picks its own server. Returns `false` when the server
    /// answered "not stored".
    #[instrument(skip(self, value), fields(bytes = value.len()))]
    pub async fn set(&mut self, key: &str, value: Bytes, expiry: u32) -> Result<bool, QueueError> {
        validate_key(key)?;
        let transport = Arc::clone(&self.transport);
        let count = transport.server_count();
        if count == 0 {
            return Err(TransportError::NoServers.into());
        }

        let random = &mut self.random;
        let outcome = self
            .retry_policy
            .run(|| {
                let server = random.next_index(count);
                let transport = Arc::clone(&transport);
                let value = value.clone();
                async move { transport.set(server, key, value, expiry).await }
            })
            .await;

        match outcome {
            Ok(WriteOutcome::Completed(())) => Ok(true),
            Ok(WriteOutcome::InProgress) => Ok(true),
            Err(TransportError::NotStored) => {
                warn!(key = %key, "Server did not store item");
                Ok(false)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Delete the queue `key` from every server.
    ///
    /// Servers that do not know the queue are skipped.
    pub async fn delete(&mut self, key: &str) -> Result<(), QueueError> {
        validate_key(key)?;
        let transport = Arc::clone(&self.transport);

        for server in 0..transport.server_count() {
            let outcome = self
                .retry_policy
                .run(|| transport.delete(server, key))
                .await;

            match outcome {
                Ok(_) | Err(TransportError::NotFound) => {}
                Err(error) => return Err(error.into()),
            }
        }

        Ok(())
    }

    /// Read and discard every item of `key` on every server.
    ///
    /// Servers that are down are skipped.
    pub async fn flush(&mut self, key: &str) -> Result<u64, QueueError> {
        validate_key(key)?;
        let wire_key = ReadOptions::new().encode_key(key, None);
        let mut discarded = 0u64;

        for server in 0..self.transport.server_count() {
            loop {
                match self.transport.get(server, &wire_key).await {
                    Ok(Some(_)) => discarded += 1,
                    Ok(None) => break,
                    Err(error) if error.is_absorbed_on_read() => {
                        warn!(
                            server = %self.transport.server_name(server),
                            error = %error,
                            "Skipping unreachable server during flush"
                        );
                        break;
                    }
                    Err(error) => return Err(error.into()),
                }
            }
        }

        info!(key = %key, discarded, "Flushed queue");
        Ok(discarded)
    }

    /// Statistics of every reachable server, merged
    pub async fn stats(&mut self) -> Result<ServerStats, QueueError> {
        let mut merged = ServerStats::default();

        for server in 0..self.transport.server_count() {
            match self.transport.stats(server).await {
                Ok(pairs) => merged.merge(&ServerStats::from_raw(&pairs)),
                Err(error) if error.is_absorbed_on_read() => {
                    warn!(
                        server = %self.transport.server_name(server),
                        error = %error,
                        "Skipping unreachable server in stats"
                    );
                }
                Err(error) => return Err(error.into()),
            }
        }

        Ok(merged)
    }

    /// Statistics of `key` merged across servers
    pub async fn stat(&mut self, key: &str) -> Result<Option<QueueStats>, QueueError> {
        validate_key(key)?;
        Ok(self.stats().await?.queue(key).cloned())
    }

    /// Items waiting in `key` across all servers
    pub async fn sizeof(&mut self, key: &str) -> Result<u64, QueueError> {
        validate_key(key)?;
        Ok(self.stats().await?.queue_size(key))
    }

    /// Names of the queues known to any server, sorted
    pub async fn available_queues(&mut self) -> Result<Vec<String>, QueueError> {
        Ok(self.stats().await?.queue_names())
    }
}

#[async_trait]
impl QueueClient for Client {
    async fn get(
        &mut self,
        key: &str,
        options: &ReadOptions,
    ) -> Result<Option<Bytes>, QueueError> {
        Client::get(self, key, options).await
    }

    async fn set(&mut self, key: &str, value: Bytes, expiry: u32) -> Result<bool, QueueError> {
        Client::set(self, key, value, expiry).await
    }

    async fn delete(&mut self, key: &str) -> Result<(), QueueError> {
        Client::delete(self, key).await
    }

    async fn flush(&mut self, key: &str) -> Result<u64, QueueError> {
        Client::flush(self, key).await
    }

    async fn stat(&mut self, key: &str) -> Result<Option<QueueStats>, QueueError> {
        Client::stat(self, key).await
    }
}

#[async_trait]
impl TransactionClient for Client {
    async fn get_from_last(&mut self, wire_key: &str) -> Result<Option<Bytes>, QueueError> {
        Client::get_from_last(self, wire_key).await
    }
}
