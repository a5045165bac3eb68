//! # Kestrel Client
//!
//! Client for work queues served over the memcached text protocol, with
//! queue verbs carried in the read key.
//!
//! This library provides:
//! - Sticky server selection for reads and random placement for writes
//! - Bounded retries of writes after recoverable network failures
//! - Transactional job delivery with a paired error queue per queue
//! - Blocking reads with backoff, deadlines and cancellation
//! - Key namespacing, queue partitioning and JSON payload wrappers
//! - In-memory and TCP transports
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for transport and queue operations
//! - [`command`] - Read options and the key-suffix verb encoding
//! - [`client`] - The per-consumer client and the [`QueueClient`] trait
//! - [`transactional`] - At-least-once delivery with retry accounting
//! - [`blocking`] - Waiting reads
//! - [`transports`] - Transport implementations
//!
//! ## Example
//!
//! ```rust,no_run
//! use kestrel_client::{Client, ClientConfig, ReadOptions, Transactional};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::new(vec!["localhost:22133".to_string()]);
//! let mut jobs = Transactional::new(Client::from_config(&config)?);
//!
//! while let Some(payload) = jobs.get("jobs", &ReadOptions::new()).await? {
//!     if payload.is_empty() {
//!         jobs.retry(None).await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod blocking;
pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod job;
pub mod proxies;
pub mod random;
pub mod retry;
pub mod router;
pub mod stats;
pub mod transactional;
pub mod transport;
pub mod transports;

// Re-export commonly used types at crate root for convenience
pub use blocking::{Blocking, WaitPolicy};
pub use client::{Client, QueueClient, TransactionClient};
pub use command::{error_queue, ReadOptions, ERROR_QUEUE_SUFFIX};
pub use config::{ClientConfig, ConfigSet, TransactionalConfig};
pub use error::{
    ConfigurationError, QueueError, SerializationError, TransportError, TransportErrorKind,
};
pub use job::RetryableJob;
pub use proxies::{Json, JsonItem, Namespace, Partitioning};
pub use random::{RandomSource, ScriptedRandom, StdRandom};
pub use retry::{RetryPolicy, WriteOutcome};
pub use stats::{QueueStats, ServerStats, StatValue};
pub use transactional::Transactional;
pub use transport::Transport;
pub use transports::{InMemoryTransport, TcpTransport};

// Cancellation for blocking reads
pub use tokio_util::sync::CancellationToken;
