//! In-memory queue transport for testing and development.
//!
//! This module simulates a set of queue servers in process:
//! - FIFO queues created on first write
//! - Server-side read transactions driven by the key suffix verbs
//!   (`/open`, `/close`, `/abort`, `/peek`; `/t=` is accepted and ignored)
//! - Failure injection per server
//! - A log of every call, so tests can assert which server saw which key

use crate::command::QueueCommand;
use crate::error::TransportError;
use crate::transport::Transport;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Call Log
// ============================================================================

/// Transport operation recorded in the call log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Get,
    Set,
    Delete,
    Stats,
}

/// A single call made against the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportCall {
    pub operation: Operation,
    pub server: usize,
    pub key: String,
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Internal state for a single queue
#[derive(Default)]
struct MemoryQueue {
    items: VecDeque<Bytes>,
    /// Item handed out by `/open` and not yet closed or aborted
    open_item: Option<Bytes>,
    total_items: u64,
}

impl MemoryQueue {
    fn bytes(&self) -> usize {
        self.items.iter().map(Bytes::len).sum()
    }
}

/// Internal state for a single simulated server
#[derive(Default)]
struct MemoryServer {
    queues: BTreeMap<String, MemoryQueue>,
    pending_failures: VecDeque<TransportError>,
    down: bool,
    cmd_get: u64,
    cmd_set: u64,
}

impl MemoryServer {
    fn check_available(&mut self, name: &str) -> Result<(), TransportError> {
        if self.down {
            return Err(TransportError::ServerDown {
                server: name.to_string(),
            });
        }

        match self.pending_failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn get(&mut self, key: &str) -> Result<Option<Bytes>, TransportError> {
        self.cmd_get += 1;
        let command = QueueCommand::parse(key);
        let options = command.options;

        let Some(queue) = self.queues.get_mut(&command.queue) else {
            return Ok(None);
        };

        if options.close {
            queue.open_item = None;
        }

        if options.abort {
            if let Some(item) = queue.open_item.take() {
                queue.items.push_front(item);
            }
            return Ok(None);
        }

        if options.peek {
            return Ok(queue.items.front().cloned());
        }

        if options.open {
            if queue.open_item.is_some() {
                return Err(TransportError::Protocol {
                    message: format!("transaction already open on '{}'", command.queue),
                });
            }

            let item = queue.items.pop_front();
            queue.open_item = item.clone();
            return Ok(item);
        }

        if options.close {
            return Ok(None);
        }

        Ok(queue.items.pop_front())
    }

    fn set(&mut self, key: &str, value: Bytes) {
        self.cmd_set += 1;
        let queue = self.queues.entry(key.to_string()).or_default();
        queue.items.push_back(value);
        queue.total_items += 1;
    }

    fn stats(&self) -> Vec<(String, String)> {
        let curr_items: usize = self.queues.values().map(|q| q.items.len()).sum();
        let total_items: u64 = self.queues.values().map(|q| q.total_items).sum();

        let mut stats = vec![
            ("version".to_string(), "memory".to_string()),
            ("curr_items".to_string(), curr_items.to_string()),
            ("total_items".to_string(), total_items.to_string()),
            ("cmd_get".to_string(), self.cmd_get.to_string()),
            ("cmd_set".to_string(), self.cmd_set.to_string()),
        ];

        for (name, queue) in &self.queues {
            let open = usize::from(queue.open_item.is_some());
            stats.push((format!("queue_{}_items", name), queue.items.len().to_string()));
            stats.push((format!("queue_{}_bytes", name), queue.bytes().to_string()));
            stats.push((
                format!("queue_{}_total_items", name),
                queue.total_items.to_string(),
            ));
            stats.push((format!("queue_{}_open_transactions", name), open.to_string()));
        }

        stats
    }
}

struct Storage {
    servers: Vec<MemoryServer>,
    calls: Vec<TransportCall>,
}

// ============================================================================
// InMemoryTransport
// ============================================================================

/// In-memory transport simulating `server_count` queue servers.
///
/// Clones share the same storage.
#[derive(Clone)]
pub struct InMemoryTransport {
    storage: Arc<Mutex<Storage>>,
}

impl InMemoryTransport {
    /// Create a transport with `server_count` empty servers
    pub fn new(server_count: usize) -> Self {
        let servers = (0..server_count).map(|_| MemoryServer::default()).collect();
        Self {
            storage: Arc::new(Mutex::new(Storage {
                servers,
                calls: Vec::new(),
            })),
        }
    }

    fn storage(&self) -> MutexGuard<'_, Storage> {
        self.storage
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append `value` to `queue` on `server` without logging a call
    pub fn enqueue(&self, server: usize, queue: &str, value: impl Into<Bytes>) {
        let mut storage = self.storage();
        if let Some(target) = storage.servers.get_mut(server) {
            let entry = target.queues.entry(queue.to_string()).or_default();
            entry.items.push_back(value.into());
            entry.total_items += 1;
        }
    }

    /// Items waiting on `queue` at `server`, head first
    pub fn items(&self, server: usize, queue: &str) -> Vec<Bytes> {
        self.storage()
            .servers
            .get(server)
            .and_then(|s| s.queues.get(queue))
            .map(|q| q.items.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Item currently held by an open transaction on `queue` at `server`
    pub fn open_item(&self, server: usize, queue: &str) -> Option<Bytes> {
        self.storage()
            .servers
            .get(server)
            .and_then(|s| s.queues.get(queue))
            .and_then(|q| q.open_item.clone())
    }

    /// Fail the next call on `server` with `error`
    pub fn fail_next(&self, server: usize, error: TransportError) {
        if let Some(target) = self.storage().servers.get_mut(server) {
            target.pending_failures.push_back(error);
        }
    }

    /// Mark `server` as down (or back up)
    pub fn set_down(&self, server: usize, down: bool) {
        if let Some(target) = self.storage().servers.get_mut(server) {
            target.down = down;
        }
    }

    /// Every call made so far
    pub fn calls(&self) -> Vec<TransportCall> {
        self.storage().calls.clone()
    }

    /// Return and forget the calls made so far
    pub fn take_calls(&self) -> Vec<TransportCall> {
        std::mem::take(&mut self.storage().calls)
    }

    fn with_server<T>(
        &self,
        operation: Operation,
        server: usize,
        key: &str,
        f: impl FnOnce(&mut MemoryServer) -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        let mut storage = self.storage();
        storage.calls.push(TransportCall {
            operation,
            server,
            key: key.to_string(),
        });

        let name = self.server_name(server);
        let target = storage
            .servers
            .get_mut(server)
            .ok_or(TransportError::NoServers)?;
        target.check_available(&name)?;
        f(target)
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    fn server_count(&self) -> usize {
        self.storage().servers.len()
    }

    fn server_name(&self, server: usize) -> String {
        format!("memory-{}", server)
    }

    async fn get(&self, server: usize, key: &str) -> Result<Option<Bytes>, TransportError> {
        self.with_server(Operation::Get, server, key, |s| s.get(key))
    }

    async fn set(
        &self,
        server: usize,
        key: &str,
        value: Bytes,
        _expiry: u32,
    ) -> Result<(), TransportError> {
        self.with_server(Operation::Set, server, key, |s| {
            s.set(key, value);
            Ok(())
        })
    }

    async fn delete(&self, server: usize, key: &str) -> Result<(), TransportError> {
        self.with_server(Operation::Delete, server, key, |s| {
            s.queues
                .remove(key)
                .map(|_| ())
                .ok_or(TransportError::NotFound)
        })
    }

    async fn stats(&self, server: usize) -> Result<Vec<(String, String)>, TransportError> {
        self.with_server(Operation::Stats, server, "", |s| Ok(s.stats()))
    }
}
