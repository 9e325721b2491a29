//! Connection pooling across networks.
//!
//! The [`Manager`] keeps at most one live [`Bot`] per [`Network`]. Resolving a
//! channel on a network with no bot creates one, attaches every known plugin
//! and connects it in the background. When the connection ends, for any
//! reason, the bot is dropped from the pool; the next resolve creates a fresh
//! one.
//!
//! Removal runs from two places: the `disconnected` handler of the manager's
//! own lifecycle plugin and the completion of the connect task. Whichever runs
//! second finds nothing to remove.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use courier_core::{BoxedConnector, Channel, EventKind, Network};

use crate::bot::{Bot, BotConfig};
use crate::channel::ChannelProxy;
use crate::context::HandlerContext;
use crate::error::BoxError;
use crate::plugin::Plugin;
use crate::plugin::builtin::ready::{READY_PLUGIN, ready_plugin};

/// Name of the manager's lifecycle plugin.
pub const MANAGER_PLUGIN: &str = "manager";

struct ManagerInner {
    connector: BoxedConnector,
    bot_config: BotConfig,
    pool: Mutex<HashMap<Network, Bot>>,
    plugins: Mutex<Vec<Arc<Plugin>>>,
    lifecycle: Arc<Plugin>,
}

/// Maps networks to live bots. Cheap to clone.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

impl Manager {
    /// Creates a manager. The ready plugin is always registered.
    pub fn new(connector: BoxedConnector, bot_config: BotConfig) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<ManagerInner>| {
            let weak = weak.clone();
            let lifecycle = Plugin::new(MANAGER_PLUGIN).on_blocking(EventKind::Disconnected, move |ctx| {
                forget_bot(ctx, weak.clone())
            });

            ManagerInner {
                connector,
                bot_config,
                pool: Mutex::new(HashMap::new()),
                plugins: Mutex::new(vec![Arc::new(ready_plugin())]),
                lifecycle: Arc::new(lifecycle),
            }
        });
        Self { inner }
    }

    /// Returns the proxy for `channel` on `network`, creating and connecting a
    /// bot if the network has none.
    ///
    /// Must be called within a Tokio runtime.
    pub fn resolve(&self, network: &Network, channel: &Channel) -> ChannelProxy {
        let bot = {
            let mut pool = self.inner.pool.lock();
            match pool.get(network) {
                Some(bot) if !bot.is_closed() => bot.clone(),
                _ => {
                    let bot = self.spawn_bot(network.clone());
                    pool.insert(network.clone(), bot.clone());
                    bot
                }
            }
        };
        bot.channel(channel)
    }

    /// Called with the pool locked.
    fn spawn_bot(&self, network: Network) -> Bot {
        let bot = Bot::new(network, Arc::clone(&self.inner.connector), self.inner.bot_config.clone());
        for plugin in self.inner.plugins.lock().iter() {
            bot.register_plugin(Arc::clone(plugin));
        }
        bot.register_plugin(Arc::clone(&self.inner.lifecycle));
        info!(bot_id = bot.id(), network = %bot.network(), "Starting bot");

        let weak = Arc::downgrade(&self.inner);
        let task_bot = bot.clone();
        tokio::spawn(async move {
            let result = match task_bot.connect().await {
                Ok(task) => match task.await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(bot_id = task_bot.id(), error = %e, "Read loop panicked");
                        Ok(())
                    }
                },
                Err(e) => Err(e),
            };

            if let Err(e) = result {
                warn!(bot_id = task_bot.id(), network = %task_bot.network(), error = %e, "Bot stopped with error");
            }
            task_bot.close();

            if let Some(inner) = weak.upgrade() {
                Manager { inner }.remove_bot(&task_bot);
            }
        });

        bot
    }

    /// Drops `bot` from the pool if it is still the network's bot.
    ///
    /// Returns `false` when it was already gone.
    pub fn remove_bot(&self, bot: &Bot) -> bool {
        let mut pool = self.inner.pool.lock();
        let current = pool.get(bot.network()).is_some_and(|b| b.id() == bot.id());
        if current {
            pool.remove(bot.network());
            info!(bot_id = bot.id(), network = %bot.network(), "Removed bot from pool");
        }
        current
    }

    // ─── Plugins ──────────────────────────────────────────────────────────────

    /// Registers `plugin` on every live bot and every bot created later.
    pub fn register_plugin(&self, plugin: Arc<Plugin>) {
        let pool = self.inner.pool.lock();
        {
            let mut plugins = self.inner.plugins.lock();
            if plugins.iter().any(|p| Arc::ptr_eq(p, &plugin)) {
                return;
            }
            plugins.push(Arc::clone(&plugin));
        }
        for bot in pool.values() {
            bot.register_plugin(Arc::clone(&plugin));
        }
        debug!(plugin = %plugin.name(), bots = pool.len(), "Registered plugin");
    }

    /// Removes the plugin named `name` from every bot.
    ///
    /// The ready plugin cannot be removed; channel joins depend on it.
    pub fn unregister_plugin(&self, name: &str) -> Option<Arc<Plugin>> {
        if name == READY_PLUGIN {
            warn!("Refusing to unregister the ready plugin");
            return None;
        }

        let pool = self.inner.pool.lock();
        let plugin = {
            let mut plugins = self.inner.plugins.lock();
            let index = plugins.iter().position(|p| p.name() == name)?;
            plugins.remove(index)
        };
        for bot in pool.values() {
            bot.unregister_plugin(&plugin);
        }
        debug!(plugin = %plugin.name(), "Unregistered plugin");
        Some(plugin)
    }

    /// Plugins attached to new bots, the ready plugin first.
    pub fn plugins(&self) -> Vec<Arc<Plugin>> {
        self.inner.plugins.lock().clone()
    }

    // ─── Pool inspection ──────────────────────────────────────────────────────

    /// The live bot for `network`, if any.
    pub fn bot(&self, network: &Network) -> Option<Bot> {
        self.inner.pool.lock().get(network).cloned()
    }

    pub fn bots(&self) -> Vec<Bot> {
        self.inner.pool.lock().values().cloned().collect()
    }

    pub fn bot_count(&self) -> usize {
        self.inner.pool.lock().len()
    }

    /// Sends `QUIT` on every bot, waits up to `grace` for the connections to
    /// end, then closes whatever is left.
    pub async fn shutdown(&self, reason: &str, grace: Duration) {
        let bots = self.bots();
        if bots.is_empty() {
            return;
        }
        info!(bots = bots.len(), "Shutting down bots");

        for bot in &bots {
            if let Err(e) = bot.quit(Some(reason)) {
                debug!(bot_id = bot.id(), error = %e, "QUIT not sent");
            }
        }

        let all_closed = join_all(bots.iter().map(|bot| bot.closed()));
        if tokio::time::timeout(grace, all_closed).await.is_err() {
            warn!("Bots did not close within the grace period");
        }

        for bot in &bots {
            bot.close();
            self.remove_bot(bot);
        }
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let networks: Vec<String> = self.inner.pool.lock().keys().map(ToString::to_string).collect();
        f.debug_struct("Manager").field("networks", &networks).finish()
    }
}

async fn forget_bot(ctx: HandlerContext, manager: Weak<ManagerInner>) -> Result<(), BoxError> {
    if let Some(inner) = manager.upgrade() {
        Manager { inner }.remove_bot(ctx.bot());
    }
    Ok(())
}
