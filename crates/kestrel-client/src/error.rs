//! Error types for queue operations.

use thiserror::Error;

/// Message fragment the transport reports when a non-blocking connect has not
/// finished yet. Such failures are not real failures.
const OPERATION_IN_PROGRESS: &str = "Operation now in progress";

/// Errors raised by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Key not found")]
    NotFound,

    #[error("Value not stored")]
    NotStored,

    #[error("Server {server} is marked dead")]
    ServerDown { server: String },

    #[error("Operation timed out on {server}")]
    Timeout { server: String },

    #[error("Connection to {server} failed: {message}")]
    ConnectionFailure { server: String, message: String },

    #[error("Connection bind failure: {message}")]
    ConnectionBindFailure { message: String },

    #[error("Socket create failure: {message}")]
    SocketCreateFailure { message: String },

    #[error("Transport failure: {message}")]
    Failure { message: String },

    #[error("Memory allocation failure")]
    MemoryAllocationFailure,

    #[error("Read failure on {server}: {message}")]
    ReadFailure { server: String, message: String },

    #[error("Write failure on {server}: {message}")]
    WriteFailure { server: String, message: String },

    #[error("System error: {message}")]
    SystemError { message: String },

    #[error("Unknown read failure on {server}")]
    UnknownReadFailure { server: String },

    #[error("Server error: {message}")]
    ServerError { message: String },

    #[error("Bad key: {key}")]
    BadKey { key: String },

    #[error("Action queue full")]
    ActionQueueFull,

    #[error("No servers defined")]
    NoServers,

    #[error("Protocol error: {message}")]
    Protocol { message: String },
}

/// Coarse classification of transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    NotFound,
    ServerDown,
    Timeout,
    ConnectionFailure,
    TransientSystemError,
    Other,
}

impl TransportError {
    /// Classify the error
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            Self::NotFound => TransportErrorKind::NotFound,
            Self::ServerDown { .. } => TransportErrorKind::ServerDown,
            Self::Timeout { .. } => TransportErrorKind::Timeout,
            Self::ConnectionFailure { .. }
            | Self::ConnectionBindFailure { .. }
            | Self::SocketCreateFailure { .. } => TransportErrorKind::ConnectionFailure,
            Self::Failure { .. }
            | Self::MemoryAllocationFailure
            | Self::ReadFailure { .. }
            | Self::WriteFailure { .. }
            | Self::SystemError { .. }
            | Self::UnknownReadFailure { .. }
            | Self::ServerError { .. } => TransportErrorKind::TransientSystemError,
            Self::NotStored
            | Self::BadKey { .. }
            | Self::ActionQueueFull
            | Self::NoServers
            | Self::Protocol { .. } => TransportErrorKind::Other,
        }
    }

    /// Check if a write failing with this error may be attempted again
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            TransportErrorKind::ServerDown
                | TransportErrorKind::Timeout
                | TransportErrorKind::ConnectionFailure
                | TransportErrorKind::TransientSystemError
        )
    }

    /// Check if this is the spurious "operation now in progress" system error
    pub fn is_operation_in_progress(&self) -> bool {
        match self {
            Self::SystemError { message } => message.contains(OPERATION_IN_PROGRESS),
            _ => false,
        }
    }

    /// Check if a read failing with this error should be reported as an empty queue.
    ///
    /// A dead server and an empty queue look the same to a reader.
    pub fn is_absorbed_on_read(&self) -> bool {
        matches!(
            self.kind(),
            TransportErrorKind::ServerDown | TransportErrorKind::Timeout
        )
    }
}

/// Comprehensive error type for all queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Transaction already open on queue '{open}', cannot read from '{requested}'")]
    MultipleQueues { open: String, requested: String },

    #[error("No transaction is open")]
    NoOpenTransaction,

    #[error("Invalid queue key '{key}': {message}")]
    InvalidKey { key: String, message: String },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl QueueError {
    /// Check if error is transient and the operation may succeed later
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(error) => error.is_recoverable(),
            Self::MultipleQueues { .. } => false,
            Self::NoOpenTransaction => false,
            Self::InvalidKey { .. } => false,
            Self::Serialization(_) => false,
            Self::Configuration(_) => false,
        }
    }
}

/// Errors during payload serialization/deserialization
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("Job envelope is malformed: {message}")]
    InvalidEnvelope { message: String },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
