//! Error types for the Courier framework.

use thiserror::Error;

use courier_core::TransportError;

/// Boxed error returned by event handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced by a bot and its channel proxies.
#[derive(Debug, Error)]
pub enum BotError {
    /// The peer sent more than `limit` bytes without a line terminator.
    ///
    /// Treated as a protocol violation: the connection is torn down and
    /// never retried by the bot itself.
    #[error("input buffer exceeded {limit} bytes without a line terminator")]
    BufferExceeded {
        /// The configured maximum buffer size.
        limit: usize,
    },

    /// The transport could not be opened.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// `connect` was called on a bot that is connecting or connected.
    #[error("bot is already connected")]
    AlreadyConnected,

    /// The bot has been closed, or was dropped.
    #[error("bot is closed")]
    Closed,

    /// I/O error on an open connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for bot operations.
pub type BotResult<T> = Result<T, BotError>;
