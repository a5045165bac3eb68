//! Sticky server selection for queue reads.
//!
//! A consumer keeps reading from the same server for up to `gets_per_server`
//! consecutive reads of one queue. Changing queue, exhausting the budget or
//! getting an empty read sends the next read to a random server, which keeps
//! consumers from piling onto a server that has gone away.

use tracing::debug;

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;

/// How a read picks its server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadRoute {
    /// Pick any server at random
    Random,
    /// Reuse the last server this consumer read from
    Sticky,
}

/// Per-consumer sticky routing state
#[derive(Debug, Clone)]
pub struct StickyRouter {
    gets_per_server: u32,
    current_queue: Option<String>,
    counter: u32,
    last_server: Option<usize>,
}

impl StickyRouter {
    /// Create a router allowing `gets_per_server` sticky reads per server
    pub fn new(gets_per_server: u32) -> Self {
        Self {
            gets_per_server,
            current_queue: None,
            counter: 0,
            last_server: None,
        }
    }

    /// Decide the route for the next read of `queue`
    pub fn select(&mut self, queue: &str) -> ReadRoute {
        let queue_changed = self.current_queue.as_deref() != Some(queue);

        if queue_changed || self.counter >= self.gets_per_server {
            self.counter = 0;
            self.current_queue = Some(queue.to_string());
            debug!(queue = %queue, queue_changed, "Routing read to a random server");
            ReadRoute::Random
        } else {
            self.counter += 1;
            ReadRoute::Sticky
        }
    }

    /// Force the next read onto a random server
    pub fn record_empty(&mut self) {
        self.counter = self.gets_per_server;
    }

    /// Remember the server that served the last read
    pub fn set_last_server(&mut self, server: usize) {
        self.last_server = Some(server);
    }

    /// Server that served the last read, if any
    pub fn last_server(&self) -> Option<usize> {
        self.last_server
    }

    /// Queue the sticky counter currently tracks
    pub fn current_queue(&self) -> Option<&str> {
        self.current_queue.as_deref()
    }

    /// Sticky reads issued since the last random pick
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Configured sticky budget
    pub fn gets_per_server(&self) -> u32 {
        self.gets_per_server
    }
}
