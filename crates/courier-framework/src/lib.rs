//! # Courier Framework
//!
//! The IRC connection and channel-management engine.
//!
//! This layer provides:
//! - [`EventBus`]: per-bot fan-out dispatch plus wait/notify
//! - [`Plugin`]: named bundles of handlers with per-bot metadata
//! - [`Bot`]: one connection with separate read and write loops
//! - [`ChannelProxy`]: join-before-send access to one channel
//! - [`Manager`]: one bot per network, created and removed on demand
//! - Built-in plugins for identity, readiness, rate limiting, ping and logging
//!
//! Transports are supplied through [`courier_core::Connector`]; see
//! `courier-transport` for TCP/TLS and in-memory implementations.

pub mod bot;
pub mod bus;
pub mod channel;
pub mod context;
pub mod error;
pub mod manager;
pub mod plugin;

#[cfg(test)]
mod testing;

pub use bot::{Bot, BotConfig, BotState, ConnectionTask, DEFAULT_MAX_BUFFER};
pub use bus::{EventBus, EventWaiter};
pub use channel::ChannelProxy;
pub use context::{EventData, Handler, HandlerContext};
pub use error::{BotError, BotResult, BoxError};
pub use manager::{MANAGER_PLUGIN, Manager};
pub use plugin::{HandlerEntry, Plugin};
