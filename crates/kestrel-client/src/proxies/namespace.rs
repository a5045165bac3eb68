//! Queue names scoped under a `<namespace>:` prefix.

use crate::client::{Client, QueueClient, TransactionClient};
use crate::command::ReadOptions;
use crate::error::QueueError;
use crate::stats::QueueStats;
use async_trait::async_trait;
use bytes::Bytes;

#[cfg(test)]
#[path = "namespace_tests.rs"]
mod tests;

const SEPARATOR: char = ':';

/// Client wrapper prefixing every key with a namespace
pub struct Namespace<C> {
    namespace: String,
    inner: C,
}

impl<C> Namespace<C> {
    pub fn new(namespace: impl Into<String>, inner: C) -> Self {
        Self {
            namespace: namespace.into(),
            inner,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Full queue name for `key`
    pub fn namespaced(&self, key: &str) -> String {
        format!("{}{}{}", self.namespace, SEPARATOR, key)
    }

    /// Unprefixed name of `queue` if it belongs to this namespace
    pub fn in_namespace<'a>(&self, queue: &'a str) -> Option<&'a str> {
        queue
            .strip_prefix(self.namespace.as_str())?
            .strip_prefix(SEPARATOR)
            .filter(|key| !key.is_empty())
    }

    /// Unprefixed names of the queues in `queues` that belong to this namespace
    pub fn filter_queues<S: AsRef<str>>(&self, queues: &[S]) -> Vec<String> {
        queues
            .iter()
            .filter_map(|queue| self.in_namespace(queue.as_ref()))
            .map(str::to_string)
            .collect()
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
}

impl Namespace<Client> {
    /// Queues of this namespace known to any server
    pub async fn available_queues(&mut self) -> Result<Vec<String>, QueueError> {
        let queues = self.inner.available_queues().await?;
        Ok(self.filter_queues(&queues))
    }
}

#[async_trait]
impl<C: QueueClient> QueueClient for Namespace<C> {
    async fn get(
        &mut self,
        key: &str,
        options: &ReadOptions,
    ) -> Result<Option<Bytes>, QueueError> {
        let key = self.namespaced(key);
        self.inner.get(&key, options).await
    }

    async fn set(&mut self, key: &str, value: Bytes, expiry: u32) -> Result<bool, QueueError> {
        let key = self.namespaced(key);
        self.inner.set(&key, value, expiry).await
    }

    async fn delete(&mut self, key: &str) -> Result<(), QueueError> {
        let key = self.namespaced(key);
        self.inner.delete(&key).await
    }

    async fn flush(&mut self, key: &str) -> Result<u64, QueueError> {
        let key = self.namespaced(key);
        self.inner.flush(&key).await
    }

    async fn stat(&mut self, key: &str) -> Result<Option<QueueStats>, QueueError> {
        let key = self.namespaced(key);
        self.inner.stat(&key).await
    }
}

#[async_trait]
impl<C: TransactionClient> TransactionClient for Namespace<C> {
    async fn get_from_last(&mut self, wire_key: &str) -> Result<Option<Bytes>, QueueError> {
        let wire_key = self.namespaced(wire_key);
        self.inner.get_from_last(&wire_key).await
    }
}
