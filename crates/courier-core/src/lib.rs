//! # Courier Core
//!
//! Leaf types for the Courier IRC relay engine.
//!
//! - **Messages**: parsing and encoding of protocol lines ([`Message`], [`encode`])
//! - **Identities**: network and channel identities ([`Network`], [`Channel`])
//! - **Events**: names used on a bot's event bus ([`EventKind`])
//! - **Metadata**: typed per-plugin storage on each bot ([`Metadata`])
//! - **Transport**: the [`Connector`] seam that opens byte streams
//!
//! Nothing here knows about bots or tasks; those live in `courier-framework`.

pub mod error;
pub mod event;
pub mod message;
pub mod metadata;
pub mod network;
pub mod transport;

pub use error::{ParseError, ParseResult, TransportError, TransportResult};
pub use event::EventKind;
pub use message::{Message, Prefix, encode};
pub use metadata::Metadata;
pub use network::{Channel, Network, channel_key};
pub use transport::{AsyncStream, BoxedConnector, BoxedStream, Connector};
