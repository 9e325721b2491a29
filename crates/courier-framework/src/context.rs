//! Values handed to event handlers.

use std::sync::Arc;

use futures::future::BoxFuture;

use courier_core::{EventKind, Message, Prefix};

use crate::bot::Bot;
use crate::error::BoxError;
use crate::plugin::Plugin;

/// A type-erased event handler.
pub type Handler =
    Arc<dyn Fn(HandlerContext) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// The payload carried by one emission.
///
/// Inbound events carry the parsed [`Message`] and the raw line; `before_write`
/// carries only the outbound line; lifecycle events carry nothing.
#[derive(Debug, Clone, Default)]
pub struct EventData {
    message: Option<Arc<Message>>,
    line: Option<Arc<str>>,
}

impl EventData {
    /// An empty payload.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Payload for a received line.
    pub fn from_message(message: Arc<Message>, line: Arc<str>) -> Self {
        Self {
            message: Some(message),
            line: Some(line),
        }
    }

    /// Payload for an outbound line.
    pub fn from_line(line: Arc<str>) -> Self {
        Self {
            message: None,
            line: Some(line),
        }
    }

    /// The parsed message, for inbound events.
    pub fn message(&self) -> Option<&Message> {
        self.message.as_deref()
    }

    /// The raw line without its terminator.
    pub fn line(&self) -> Option<&str> {
        self.line.as_deref()
    }
}

/// Everything a handler may ask for.
///
/// Handlers receive the full context and pick what they need; fields that do
/// not apply to the event (a prefix on `connected`, say) are simply `None`.
#[derive(Clone)]
pub struct HandlerContext {
    bot: Bot,
    event: EventKind,
    data: EventData,
    plugin: Arc<Plugin>,
}

impl HandlerContext {
    pub(crate) fn new(bot: Bot, event: EventKind, data: EventData, plugin: Arc<Plugin>) -> Self {
        Self {
            bot,
            event,
            data,
            plugin,
        }
    }

    /// The bot that emitted the event.
    pub fn bot(&self) -> &Bot {
        &self.bot
    }

    /// The event being handled.
    pub fn event(&self) -> &EventKind {
        &self.event
    }

    /// The raw payload.
    pub fn data(&self) -> &EventData {
        &self.data
    }

    pub fn message(&self) -> Option<&Message> {
        self.data.message()
    }

    /// The upper-cased command of the received line.
    pub fn command(&self) -> Option<&str> {
        self.message().map(|m| m.command.as_str())
    }

    /// Arguments of the received line; empty for non-message events.
    pub fn args(&self) -> &[String] {
        self.message().map(|m| m.args.as_slice()).unwrap_or(&[])
    }

    pub fn prefix(&self) -> Option<&Prefix> {
        self.message().and_then(|m| m.prefix.as_ref())
    }

    /// The raw line, inbound or outbound.
    pub fn line(&self) -> Option<&str> {
        self.data.line()
    }

    /// The plugin that registered the running handler.
    pub fn plugin(&self) -> &Arc<Plugin> {
        &self.plugin
    }
}

impl std::fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerContext")
            .field("bot_id", &self.bot.id())
            .field("event", &self.event)
            .field("plugin", &self.plugin.name())
            .field("line", &self.data.line())
            .finish()
    }
}
