//! JSON payloads over any [`QueueClient`].
//!
//! Values written with [`Json::set_json`] are serialized with `serde_json`.
//! [`Json::get_json`] parses them back, handing over the raw bytes when an
//! item is not valid JSON for the requested type or when the read asks for
//! `raw`.

use crate::client::QueueClient;
use crate::command::ReadOptions;
use crate::error::{QueueError, SerializationError};
use crate::stats::QueueStats;
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[cfg(test)]
#[path = "json_tests.rs"]
mod tests;

/// An item read through [`Json`]
#[derive(Debug, Clone, PartialEq)]
pub enum JsonItem<T> {
    /// The item parsed as `T`
    Parsed(T),
    /// The item as stored, for raw reads or values that did not parse
    Raw(Bytes),
}

impl<T> JsonItem<T> {
    pub fn parsed(self) -> Option<T> {
        match self {
            Self::Parsed(value) => Some(value),
            Self::Raw(_) => None,
        }
    }
}

/// Client wrapper encoding payloads as JSON
pub struct Json<C> {
    inner: C,
}

impl<C: QueueClient> Json<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
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

    /// Read an item from `key` and parse it as `T`
    pub async fn get_json<T: DeserializeOwned>(
        &mut self,
        key: &str,
        options: &ReadOptions,
    ) -> Result<Option<JsonItem<T>>, QueueError> {
        let Some(value) = self.inner.get(key, options).await? else {
            return Ok(None);
        };

        if options.raw {
            return Ok(Some(JsonItem::Raw(value)));
        }

        match serde_json::from_slice(&value) {
            Ok(parsed) => Ok(Some(JsonItem::Parsed(parsed))),
            Err(error) => {
                debug!(key = %key, error = %error, "Returning unparsed item");
                Ok(Some(JsonItem::Raw(value)))
            }
        }
    }

    /// Serialize `value` as JSON and write it to `key`
    pub async fn set_json<T: Serialize + Sync>(
        &mut self,
        key: &str,
        value: &T,
        expiry: u32,
    ) -> Result<bool, QueueError> {
        let encoded = serde_json::to_vec(value).map_err(SerializationError::from)?;
        self.inner.set(key, Bytes::from(encoded), expiry).await
    }
}

#[async_trait]
impl<C: QueueClient> QueueClient for Json<C> {
    async fn get(
        &mut self,
        key: &str,
        options: &ReadOptions,
    ) -> Result<Option<Bytes>, QueueError> {
        self.inner.get(key, options).await
    }

    async fn set(&mut self, key: &str, value: Bytes, expiry: u32) -> Result<bool, QueueError> {
        self.inner.set(key, value, expiry).await
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
