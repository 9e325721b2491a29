//! The transport seam between bots and the network.
//!
//! A [`Connector`] opens a byte stream to a [`Network`]. Bots never open
//! sockets themselves, so the same engine runs over TCP, TLS, or in-process
//! pipes. Concrete connectors live in `courier-transport`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::TransportResult;
use crate::network::Network;

/// A bidirectional byte stream.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// A boxed [`AsyncStream`].
pub type BoxedStream = Box<dyn AsyncStream>;

/// Opens transports to IRC networks.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a stream to `network`.
    ///
    /// Transient failures (refused, reset, timeout) are returned to the caller;
    /// retry policy belongs to whoever called.
    async fn connect(&self, network: &Network) -> TransportResult<BoxedStream>;
}

/// A shared [`Connector`].
pub type BoxedConnector = Arc<dyn Connector>;
