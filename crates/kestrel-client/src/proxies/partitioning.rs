//! Static routing of queues to separate clients.
//!
//! Each queue name maps to one client, so different queues can live on
//! different server pools. Names without a mapping go to the default client.

use crate::client::{Client, QueueClient, TransactionClient};
use crate::command::{ReadOptions, VERB_DELIMITER};
use crate::error::QueueError;
use crate::stats::{QueueStats, ServerStats};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

#[cfg(test)]
#[path = "partitioning_tests.rs"]
mod tests;

/// Client wrapper dispatching each key to the client it is mapped to
pub struct Partitioning<C> {
    clients: Vec<C>,
    routes: HashMap<String, usize>,
}

impl<C> Partitioning<C> {
    /// Create a partitioning where every key goes to `default`
    pub fn new(default: C) -> Self {
        Self {
            clients: vec![default],
            routes: HashMap::new(),
        }
    }

    /// Route `keys` to `client`. Later mappings of the same key win.
    pub fn with_partition<I, S>(mut self, keys: I, client: C) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let index = self.clients.len();
        self.clients.push(client);
        for key in keys {
            self.routes.insert(key.into(), index);
        }
        self
    }

    /// Every client, default first
    pub fn clients(&self) -> &[C] {
        &self.clients
    }

    pub fn default_client(&self) -> &C {
        &self.clients[0]
    }

    fn index_for(&self, key: &str) -> usize {
        self.routes.get(key).copied().unwrap_or(0)
    }

    /// Client serving `key`
    pub fn client_for(&mut self, key: &str) -> &mut C {
        let index = self.index_for(key);
        &mut self.clients[index]
    }
}

impl Partitioning<Client> {
    /// Statistics of every partition, merged
    pub async fn stats(&mut self) -> Result<ServerStats, QueueError> {
        let mut merged = ServerStats::default();
        for client in &mut self.clients {
            merged.merge(&client.stats().await?);
        }
        Ok(merged)
    }
}

#[async_trait]
impl<C: QueueClient> QueueClient for Partitioning<C> {
    async fn get(
        &mut self,
        key: &str,
        options: &ReadOptions,
    ) -> Result<Option<Bytes>, QueueError> {
        self.client_for(key).get(key, options).await
    }

    async fn set(&mut self, key: &str, value: Bytes, expiry: u32) -> Result<bool, QueueError> {
        self.client_for(key).set(key, value, expiry).await
    }

    async fn delete(&mut self, key: &str) -> Result<(), QueueError> {
        self.client_for(key).delete(key).await
    }

    async fn flush(&mut self, key: &str) -> Result<u64, QueueError> {
        self.client_for(key).flush(key).await
    }

    async fn stat(&mut self, key: &str) -> Result<Option<QueueStats>, QueueError> {
        self.client_for(key).stat(key).await
    }
}

#[async_trait]
impl<C: TransactionClient> TransactionClient for Partitioning<C> {
    /// Routed by the queue name in front of the verbs
    async fn get_from_last(&mut self, wire_key: &str) -> Result<Option<Bytes>, QueueError> {
        let queue = wire_key
            .split(VERB_DELIMITER)
            .next()
            .unwrap_or(wire_key);
        self.client_for(queue).get_from_last(wire_key).await
    }
}
