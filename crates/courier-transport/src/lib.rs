//! # Courier Transport
//!
//! [`Connector`](courier_core::Connector) implementations.
//!
//! - [`TcpConnector`]: plain TCP, or TLS when the network asks for it
//!   (requires the `tls` feature)
//! - [`MemoryConnector`]: in-process pipes, paired with a [`MemoryAcceptor`]
//!   that plays the server side

pub mod memory;
pub mod tcp;

#[cfg(feature = "tls")]
mod tls;

pub use memory::{MemoryAcceptor, MemoryConnector, memory_pair};
pub use tcp::{DEFAULT_CONNECT_TIMEOUT, TcpConnector};
