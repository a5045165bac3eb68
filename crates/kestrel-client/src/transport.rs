//! Boundary to the memcached-protocol wire transport.

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;

/// Raw key/value access to a fixed set of queue servers.
///
/// Servers are addressed by index in `0..server_count()`. Implementations keep
/// no per-consumer state and must tolerate concurrent calls; which server a
/// consumer talks to is decided by the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Number of configured servers
    fn server_count(&self) -> usize;

    /// Display name of a server, for logging
    fn server_name(&self, server: usize) -> String;

    /// Fetch the value stored under `key`. `Ok(None)` means no item.
    async fn get(&self, server: usize, key: &str) -> Result<Option<Bytes>, TransportError>;

    /// Store `value` under `key`. Rejected values fail with [`TransportError::NotStored`].
    async fn set(
        &self,
        server: usize,
        key: &str,
        value: Bytes,
        expiry: u32,
    ) -> Result<(), TransportError>;

    /// Remove `key`. Missing keys fail with [`TransportError::NotFound`].
    async fn delete(&self, server: usize, key: &str) -> Result<(), TransportError>;

    /// Raw `(name, value)` statistics reported by one server
    async fn stats(&self, server: usize) -> Result<Vec<(String, String)>, TransportError>;
}
