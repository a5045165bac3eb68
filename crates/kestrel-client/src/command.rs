//! Read options and the key-suffix encoding of queue verbs.
//!
//! Queue verbs travel inside the key of a plain `get`:
//!
//! ```text
//! key ["/open"] ["/close"] ["/abort"] ["/peek"] ["/t=" millis]
//! ```
//!
//! Fragments always appear in that order.

use crate::error::QueueError;

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;

/// Separator between a queue key and its verbs.
pub const VERB_DELIMITER: char = '/';

/// Suffix naming the error queue paired with every primary queue.
pub const ERROR_QUEUE_SUFFIX: &str = "_errors";

const TIMEOUT_PREFIX: &str = "t=";

/// Name of the error queue paired with `queue`
pub fn error_queue(queue: &str) -> String {
    format!("{}{}", queue, ERROR_QUEUE_SUFFIX)
}

/// Reject keys that would be mistaken for verb suffixes.
pub fn validate_key(key: &str) -> Result<(), QueueError> {
    if key.is_empty() {
        return Err(QueueError::InvalidKey {
            key: key.to_string(),
            message: "must not be empty".to_string(),
        });
    }

    if key.contains(VERB_DELIMITER) {
        return Err(QueueError::InvalidKey {
            key: key.to_string(),
            message: format!("must not contain '{}'", VERB_DELIMITER),
        });
    }

    Ok(())
}

/// Options controlling a single queue read
///
/// `open` and `abort` should not be combined; the encoder does not check this.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Begin a reliable read
    pub open: bool,
    /// End a reliable read
    pub close: bool,
    /// Cancel an open reliable read, returning the item to the queue
    pub abort: bool,
    /// Return the head of the queue without removing it
    pub peek: bool,
    /// Milliseconds the server may block waiting for an item.
    ///
    /// `None` uses the client default; `Some(0)` asks for a non-blocking read.
    pub timeout: Option<u64>,
    /// Skip payload decoding in wrappers. Never sent to the server.
    pub raw: bool,
}

impl ReadOptions {
    /// Create options for a plain read
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a reliable read
    pub fn open(mut self) -> Self {
        self.open = true;
        self
    }

    /// End a reliable read
    pub fn close(mut self) -> Self {
        self.close = true;
        self
    }

    /// Cancel a reliable read
    pub fn abort(mut self) -> Self {
        self.abort = true;
        self
    }

    /// Read without removing
    pub fn peek(mut self) -> Self {
        self.peek = true;
        self
    }

    /// Let the server wait up to `millis` for an item
    pub fn with_timeout(mut self, millis: u64) -> Self {
        self.timeout = Some(millis);
        self
    }

    /// Mark the read as raw
    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    /// Encode the verb suffix for these options.
    ///
    /// `default_timeout` applies when no explicit timeout was requested.
    pub fn encode(&self, default_timeout: Option<u64>) -> String {
        let verbs = [
            (self.open, "open"),
            (self.close, "close"),
            (self.abort, "abort"),
            (self.peek, "peek"),
        ];

        let mut suffix = String::new();
        for (_, verb) in verbs.iter().filter(|(set, _)| *set) {
            suffix.push(VERB_DELIMITER);
            suffix.push_str(verb);
        }

        if let Some(millis) = self.timeout.or(default_timeout) {
            suffix.push(VERB_DELIMITER);
            suffix.push_str(TIMEOUT_PREFIX);
            suffix.push_str(&millis.to_string());
        }

        suffix
    }

    /// Full wire key for a read of `key` with these options
    pub fn encode_key(&self, key: &str, default_timeout: Option<u64>) -> String {
        format!("{}{}", key, self.encode(default_timeout))
    }
}

/// Server-side wait carried by an encoded key, if any
pub fn wait_millis(encoded_key: &str) -> Option<u64> {
    encoded_key
        .split(VERB_DELIMITER)
        .skip(1)
        .find_map(|fragment| fragment.strip_prefix(TIMEOUT_PREFIX))
        .and_then(|millis| millis.parse().ok())
}

/// A decoded wire key, as seen by a queue server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueCommand {
    pub queue: String,
    pub options: ReadOptions,
}

impl QueueCommand {
    /// Split a wire key into the queue name and its verbs.
    ///
    /// Unknown fragments are ignored.
    pub fn parse(encoded_key: &str) -> Self {
        let mut fragments = encoded_key.split(VERB_DELIMITER);
        let queue = fragments.next().unwrap_or_default().to_string();
        let mut options = ReadOptions::default();

        for fragment in fragments {
            match fragment {
                "open" => options.open = true,
                "close" => options.close = true,
                "abort" => options.abort = true,
                "peek" => options.peek = true,
                other => {
                    if let Some(millis) = other.strip_prefix(TIMEOUT_PREFIX) {
                        options.timeout = millis.parse().ok();
                    }
                }
            }
        }

        Self { queue, options }
    }
}
