//! Per-bot event bus.
//!
//! The bus offers two independent primitives:
//!
//! - **Fan-out**: [`EventBus::emit`] runs every handler registered for an
//!   event. Blocking handlers are awaited in registration order before `emit`
//!   returns; non-blocking handlers are spawned as separate tasks and neither
//!   delay the emitter nor each other.
//! - **Wait/notify**: [`EventBus::subscribe`] hands out an [`EventWaiter`] that
//!   observes every emission after the call. A caller that subscribes before
//!   an event is emitted is guaranteed to see it; one that subscribes after
//!   waits for the next emission.
//!
//! Handler errors are logged and swallowed so a failing plugin can never take
//! down the read or write loop that emitted the event.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{error, trace, warn};

use courier_core::EventKind;

use crate::bot::Bot;
use crate::context::{EventData, Handler, HandlerContext};
use crate::plugin::Plugin;

/// Buffered emissions per waiter before it starts lagging.
const WAITER_CAPACITY: usize = 64;

struct Registration {
    plugin: Arc<Plugin>,
    handler: Handler,
    blocking: bool,
}

/// Maps event names to handlers and waiters.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<Registration>>>,
    waiters: Mutex<HashMap<EventKind, broadcast::Sender<EventData>>>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends every handler of `plugin` to the bus.
    pub fn register(&self, plugin: &Arc<Plugin>) {
        let mut handlers = self.handlers.write();
        for entry in plugin.handlers() {
            handlers
                .entry(entry.event().clone())
                .or_default()
                .push(Registration {
                    plugin: Arc::clone(plugin),
                    handler: Arc::clone(entry.handler()),
                    blocking: entry.is_blocking(),
                });
        }
    }

    /// Removes exactly the handlers that `plugin` registered.
    ///
    /// Returns the number of handlers removed.
    pub fn unregister(&self, plugin: &Arc<Plugin>) -> usize {
        let mut removed = 0;
        self.handlers.write().retain(|_, registrations| {
            let before = registrations.len();
            registrations.retain(|r| !Arc::ptr_eq(&r.plugin, plugin));
            removed += before - registrations.len();
            !registrations.is_empty()
        });
        removed
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: &EventKind) -> usize {
        self.handlers.read().get(event).map_or(0, Vec::len)
    }

    /// Starts observing `event`.
    ///
    /// The waiter sees every emission from this call on, so subscribe
    /// *before* triggering whatever produces the event.
    pub fn subscribe(&self, event: impl Into<EventKind>) -> EventWaiter {
        let event = event.into();
        let rx = self
            .waiters
            .lock()
            .entry(event.clone())
            .or_insert_with(|| broadcast::channel(WAITER_CAPACITY).0)
            .subscribe();
        EventWaiter { event, rx }
    }

    /// Waits for the next emission of `event`.
    pub async fn wait(&self, event: impl Into<EventKind>) -> Option<EventData> {
        self.subscribe(event).recv().await
    }

    /// Emits `event` on behalf of `bot`.
    pub async fn emit(&self, bot: &Bot, event: EventKind, data: EventData) {
        self.notify(&event, &data);

        let registrations: Vec<(Arc<Plugin>, Handler, bool)> = self
            .handlers
            .read()
            .get(&event)
            .map(|registrations| {
                registrations
                    .iter()
                    .map(|r| (Arc::clone(&r.plugin), Arc::clone(&r.handler), r.blocking))
                    .collect()
            })
            .unwrap_or_default();

        trace!(bot_id = bot.id(), event = %event, handlers = registrations.len(), "Emitting");

        for (plugin, handler, blocking) in registrations {
            let ctx = HandlerContext::new(bot.clone(), event.clone(), data.clone(), Arc::clone(&plugin));
            let future = handler(ctx);

            if blocking {
                if let Err(e) = future.await {
                    error!(bot_id = bot.id(), plugin = %plugin.name(), event = %event, error = %e, "Handler failed");
                }
            } else {
                let bot_id = bot.id();
                let event = event.clone();
                tokio::spawn(async move {
                    if let Err(e) = future.await {
                        error!(bot_id, plugin = %plugin.name(), event = %event, error = %e, "Handler failed");
                    }
                });
            }
        }
    }

    fn notify(&self, event: &EventKind, data: &EventData) {
        if let Some(tx) = self.waiters.lock().get(event) {
            // No receivers is fine: nobody is waiting right now.
            let _ = tx.send(data.clone());
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let events: Vec<String> = self.handlers.read().keys().map(ToString::to_string).collect();
        f.debug_struct("EventBus").field("events", &events).finish()
    }
}

/// A one-shot or repeated observer of one event, detached from the handler set.
#[derive(Debug)]
pub struct EventWaiter {
    event: EventKind,
    rx: broadcast::Receiver<EventData>,
}

impl EventWaiter {
    /// The observed event.
    pub fn event(&self) -> &EventKind {
        &self.event
    }

    /// Waits for the next emission. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<EventData> {
        loop {
            match self.rx.recv().await {
                Ok(data) => return Some(data),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(event = %self.event, skipped, "Waiter lagged behind emissions");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
