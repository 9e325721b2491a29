//! Error types shared across the Courier crates.

use thiserror::Error;

// =============================================================================
// Parse Errors
// =============================================================================

/// Errors produced while parsing a single protocol line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The line was empty.
    #[error("empty line")]
    Empty,

    /// The line had no command token.
    #[error("no command in line: {line:?}")]
    MissingCommand {
        /// The offending line.
        line: String,
    },
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur while establishing a transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection to {address} failed: {reason}")]
    ConnectionFailed {
        /// The `host:port` that failed to connect.
        address: String,
        /// Reason for failure.
        reason: String,
    },

    /// Connecting took longer than the configured timeout.
    #[error("connection to {address} timed out")]
    Timeout {
        /// The `host:port` that timed out.
        address: String,
    },

    /// The host is not a valid TLS server name.
    #[error("invalid TLS server name: {0}")]
    InvalidServerName(String),

    /// TLS handshake failed.
    #[error("TLS handshake with {address} failed: {reason}")]
    Tls {
        /// The `host:port` of the peer.
        address: String,
        /// Reason for failure.
        reason: String,
    },

    /// The connector has been shut down.
    #[error("connector is closed")]
    Closed,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for line parsing.
pub type ParseResult<T> = Result<T, ParseError>;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
