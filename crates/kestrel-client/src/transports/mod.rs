//! Transport implementations.
//!
//! This module contains concrete implementations of the `Transport` trait:
//! an in-memory simulation of a set of queue servers, and a TCP transport
//! speaking the memcached text protocol.

pub mod memory;
pub mod tcp;

pub use memory::{InMemoryTransport, Operation, TransportCall};
pub use tcp::TcpTransport;
