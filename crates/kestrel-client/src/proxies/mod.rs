//! Wrappers that change how keys or payloads reach an inner [`QueueClient`].
//!
//! Each wrapper implements [`QueueClient`] itself, so they stack in any order
//! with [`Transactional`](crate::transactional::Transactional) and
//! [`Blocking`](crate::blocking::Blocking).
//!
//! [`QueueClient`]: crate::client::QueueClient

pub mod json;
pub mod namespace;
pub mod partitioning;

pub use json::{Json, JsonItem};
pub use namespace::Namespace;
pub use partitioning::Partitioning;
