//! # Courier
//!
//! The IRC side of a webhook-to-chat relay: it keeps connections to IRC
//! networks, joins channels on demand and delivers messages taken from an
//! outbound queue.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────┐     ┌─────────────┐     ┌─────────┐     ┌──────────────────────────┐
//! │ Queue │────▶│ QueueBridge │────▶│ Manager │────▶│ Bot per network          │──▶ IRC
//! └───────┘     └─────────────┘     └─────────┘     │  ├ ChannelProxy per chan │
//!                                                   │  └ plugins on EventBus   │
//!                                                   └──────────────────────────┘
//! ```
//!
//! - **Bot**: one connection with a read loop, a FIFO write loop and an event bus
//! - **Plugins**: named handler sets (identity, ready, ping, rate limit, logging)
//! - **ChannelProxy**: joins a channel once the bot is registered, then sends
//! - **Manager**: pools bots by network and replaces dead ones
//! - **QueueBridge**: drains the queue and routes entries to channels
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use courier::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let queue = Arc::new(MemoryQueue::new());
//!     let runtime = CourierRuntime::builder().build(queue.clone())?;
//!
//!     queue.push(r##"{"type": "message",
//!         "channel": {"host": "irc.libera.chat", "channel": "#notices"},
//!         "payload": {"msg": "build passed"}}"##.into()).await?;
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: read `courier.toml`
//! - `yaml-config`: read `courier.yaml`
//! - `json-log`: JSON log output

pub use courier_core as core;
pub use courier_framework as framework;
pub use courier_runtime as runtime;
pub use courier_transport as transport;

/// Commonly used types.
pub mod prelude {
    pub use courier_runtime::{
        CourierConfig, CourierRuntime, MemoryQueue, Queue, QueueBridge, QueueEntry,
    };

    pub use courier_framework::plugin::builtin::{
        IdentityConfig, RateLimitConfig, identity_plugin, logging_plugin, ping_plugin,
        rate_limit_plugin, ready_plugin,
    };
    pub use courier_framework::{
        Bot, BotConfig, BoxError, ChannelProxy, EventData, HandlerContext, Manager, Plugin,
    };

    pub use courier_core::{Channel, EventKind, Message, Network};
    pub use courier_transport::TcpConnector;
}
