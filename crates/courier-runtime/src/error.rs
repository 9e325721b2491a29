//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors from a [`Queue`](crate::queue::Queue) backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The queue was closed; no further entries will arrive.
    #[error("queue is closed")]
    Closed,

    /// The backing store failed.
    #[error("queue backend error: {0}")]
    Backend(String),
}

/// Reasons a queue entry is dropped without delivery.
#[derive(Error, Debug)]
pub enum EntryError {
    /// The entry is not valid JSON or does not match any entry shape.
    #[error("malformed entry: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Neither a `network` object nor an inline `host` was given.
    #[error("entry names no network")]
    MissingNetwork,

    /// The channel name is empty.
    #[error("entry names no channel")]
    MissingChannel,

    /// The message text is empty.
    #[error("entry has an empty message")]
    EmptyMessage,
}

/// Errors that stop the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
