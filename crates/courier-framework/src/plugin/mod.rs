//! Plugin system for the Courier framework.
//!
//! # Architecture
//!
//! A [`Plugin`] is a named bundle of event-handler registrations. Plugins are
//! the unit of composition: identity negotiation, keep-alive, rate limiting,
//! logging and the manager's own bookkeeping are all plugins.
//!
//! The same `Arc<Plugin>` may be attached to any number of bots. Per-bot state
//! lives in each bot's metadata store, namespaced by the plugin name, so one
//! plugin instance keeps independent state on every bot.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! async fn greet(ctx: HandlerContext) -> Result<(), BoxError> {
//!     if let Some(nick) = ctx.prefix().map(|p| p.nick.clone()) {
//!         ctx.bot().send("NOTICE", &[nick.as_str(), "hello"])?;
//!     }
//!     Ok(())
//! }
//!
//! let plugin = Plugin::new("greeter").on("JOIN", greet);
//! manager.register_plugin(Arc::new(plugin));
//! ```
//!
//! # Blocking handlers
//!
//! Handlers registered with [`Plugin::on_blocking`] are awaited by the emitter
//! before it moves on. Use them only where the triggering operation must wait,
//! such as rate limiting on `before_write`; a slow blocking handler on an
//! inbound event stalls the bot's read loop.

pub mod builtin;
mod core;

pub use self::core::{HandlerEntry, Plugin};
