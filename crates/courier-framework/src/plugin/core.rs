use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;

use courier_core::EventKind;

use crate::bot::Bot;
use crate::context::{Handler, HandlerContext};
use crate::error::BoxError;

// ─── HandlerEntry ─────────────────────────────────────────────────────────────

/// One handler registration inside a [`Plugin`].
#[derive(Clone)]
pub struct HandlerEntry {
    event: EventKind,
    handler: Handler,
    blocking: bool,
}

impl HandlerEntry {
    /// The event this handler listens to.
    pub fn event(&self) -> &EventKind {
        &self.event
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Whether emitters await this handler.
    pub fn is_blocking(&self) -> bool {
        self.blocking
    }
}

impl std::fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("event", &self.event)
            .field("blocking", &self.blocking)
            .finish()
    }
}

// ─── Plugin ───────────────────────────────────────────────────────────────────

/// A named bundle of event handlers.
///
/// Build with [`Plugin::new`] and the `on*` methods, then wrap in an [`Arc`]
/// to register it on bots or a manager.
///
/// # Concurrency
///
/// `Plugin` is `Send + Sync`. Handlers must not capture the plugin itself;
/// they receive it through [`HandlerContext::plugin`].
#[derive(Clone)]
pub struct Plugin {
    name: Cow<'static, str>,
    handlers: Vec<HandlerEntry>,
}

impl Plugin {
    /// Creates a plugin with no handlers.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            handlers: Vec::new(),
        }
    }

    /// Returns the plugin's name, which also namespaces its metadata.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the handler registrations in the order they were added.
    pub fn handlers(&self) -> &[HandlerEntry] {
        &self.handlers
    }

    /// Adds a non-blocking handler.
    pub fn on<F, Fut>(self, event: impl Into<EventKind>, handler: F) -> Self
    where
        F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.handle(event, false, handler)
    }

    /// Adds a handler the emitter awaits before continuing.
    pub fn on_blocking<F, Fut>(self, event: impl Into<EventKind>, handler: F) -> Self
    where
        F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.handle(event, true, handler)
    }

    /// Adds a handler with explicit blocking behaviour.
    pub fn handle<F, Fut>(mut self, event: impl Into<EventKind>, blocking: bool, handler: F) -> Self
    where
        F: Fn(HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |ctx| handler(ctx).boxed());
        self.handlers.push(HandlerEntry {
            event: event.into(),
            handler,
            blocking,
        });
        self
    }

    // ─── Per-bot metadata ─────────────────────────────────────────────────────

    /// Reads this plugin's `T` on `bot`.
    pub fn get<T>(&self, bot: &Bot) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        bot.metadata().get(&self.name)
    }

    /// Reads this plugin's `T` on `bot`, or `default` when unset.
    pub fn get_or<T>(&self, bot: &Bot, default: T) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        bot.metadata().get_or(&self.name, default)
    }

    /// Reads this plugin's `T` on `bot`, creating it with `factory` first.
    pub fn get_or_insert_with<T, F>(&self, bot: &Bot, factory: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        bot.metadata().get_or_insert_with(&self.name, factory)
    }

    /// Stores this plugin's `T` on `bot`, returning the previous value.
    pub fn set<T>(&self, bot: &Bot, value: T) -> Option<T>
    where
        T: Send + Sync + 'static,
    {
        bot.metadata().set(&self.name, value)
    }

    /// Mutates this plugin's `T` on `bot` in place.
    pub fn update<T, R>(&self, bot: &Bot, factory: impl FnOnce() -> T, f: impl FnOnce(&mut T) -> R) -> R
    where
        T: Send + Sync + 'static,
    {
        bot.metadata().update(&self.name, factory, f)
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("handlers", &self.handlers)
            .finish()
    }
}
