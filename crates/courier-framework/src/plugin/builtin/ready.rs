//! Handshake completion tracking.
//!
//! Servers end registration with either end-of-MOTD (`376`) or no-MOTD
//! (`422`). The first of those sets the bot's [`ReadySignal`], which channel
//! proxies await before sending `JOIN`.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::bot::Bot;
use crate::context::HandlerContext;
use crate::error::BoxError;
use crate::plugin::Plugin;

/// Name of the ready plugin and its metadata namespace.
pub const READY_PLUGIN: &str = "ready";

const END_OF_MOTD: &str = "376";
const NO_MOTD: &str = "422";

/// A latch that flips once and wakes every waiter.
#[derive(Debug, Clone)]
pub struct ReadySignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ReadySignal {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(watch::Sender::new(false)),
        }
    }

    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the signal is set; immediately if it already is.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

/// The bot's ready signal, created on first access.
pub fn ready_signal(bot: &Bot) -> ReadySignal {
    bot.metadata().get_or_insert_with(READY_PLUGIN, ReadySignal::new)
}

/// Whether the bot has finished its handshake.
pub fn is_ready(bot: &Bot) -> bool {
    ready_signal(bot).is_set()
}

/// Creates the ready plugin.
pub fn ready_plugin() -> Plugin {
    Plugin::new(READY_PLUGIN)
        .on_blocking(END_OF_MOTD, mark_ready)
        .on_blocking(NO_MOTD, mark_ready)
}

async fn mark_ready(ctx: HandlerContext) -> Result<(), BoxError> {
    let signal = ctx.plugin().get_or_insert_with(ctx.bot(), ReadySignal::new);
    if !signal.is_set() {
        info!(bot_id = ctx.bot().id(), network = %ctx.bot().network(), "Ready");
        signal.set();
    }
    Ok(())
}
