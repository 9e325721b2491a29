//! Nickname registration.
//!
//! On `connected` the plugin sends `PASS` (when the network has a password),
//! `NICK` and `USER`. On `433` (nickname in use) it picks a fallback and sends
//! `NICK` again; `USER` has already been accepted at that point.
//!
//! Nicknames are claimed in a [`NickRegistry`] shared by every bot the plugin
//! is attached to, so two bots of this process never register the same nick at
//! the same time. Claims are released on `disconnected`.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::{info, warn};

use crate::bot::Bot;
use crate::context::HandlerContext;
use crate::error::BoxError;
use crate::plugin::Plugin;
use courier_core::EventKind;

/// Name of the identity plugin and its metadata namespace.
pub const IDENTITY_PLUGIN: &str = "identity";

const NICKNAME_IN_USE: &str = "433";
const SUFFIX_LEN: usize = 4;
const MAX_SUFFIX_ATTEMPTS: usize = 16;

/// Registration values.
///
/// Passed to [`identity_plugin`] as the process-wide default. Store one in the
/// plugin's metadata slot on a bot to override it for that bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    pub nickname: String,
    /// Tried first when `nickname` is taken.
    pub backup_nickname: Option<String>,
    pub username: String,
    pub realname: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            nickname: "courier".to_string(),
            backup_nickname: None,
            username: "courier".to_string(),
            realname: "Courier relay".to_string(),
        }
    }
}

impl IdentityConfig {
    /// Overrides the identity for one bot.
    pub fn apply_to(self, bot: &Bot) {
        bot.metadata().set(IDENTITY_PLUGIN, self);
    }
}

/// Nicknames currently held by connected bots of this process.
///
/// Comparison is case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct NickRegistry {
    claimed: Arc<Mutex<HashSet<String>>>,
}

impl NickRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `nick`; returns `false` if another bot holds it.
    pub fn claim(&self, nick: &str) -> bool {
        self.claimed.lock().insert(nick.to_lowercase())
    }

    pub fn release(&self, nick: &str) {
        self.claimed.lock().remove(&nick.to_lowercase());
    }

    pub fn is_claimed(&self, nick: &str) -> bool {
        self.claimed.lock().contains(&nick.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.claimed.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.lock().is_empty()
    }
}

/// The nickname a bot last requested.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CurrentNick(String);

/// The nickname `bot` last sent with `NICK`.
pub fn current_nick(bot: &Bot) -> Option<String> {
    bot.metadata()
        .get::<CurrentNick>(IDENTITY_PLUGIN)
        .map(|nick| nick.0)
}

/// Creates the identity plugin with its own nickname registry.
pub fn identity_plugin(defaults: IdentityConfig) -> Plugin {
    identity_plugin_with_registry(defaults, NickRegistry::new())
}

/// Creates the identity plugin over an existing registry.
pub fn identity_plugin_with_registry(defaults: IdentityConfig, registry: NickRegistry) -> Plugin {
    let defaults = Arc::new(defaults);

    let on_connected = {
        let defaults = Arc::clone(&defaults);
        let registry = registry.clone();
        move |ctx| register(ctx, Arc::clone(&defaults), registry.clone())
    };
    let on_in_use = {
        let defaults = Arc::clone(&defaults);
        let registry = registry.clone();
        move |ctx| retry_nick(ctx, Arc::clone(&defaults), registry.clone())
    };
    let on_disconnected = move |ctx| release(ctx, registry.clone());

    Plugin::new(IDENTITY_PLUGIN)
        .on_blocking(EventKind::Connected, on_connected)
        .on(NICKNAME_IN_USE, on_in_use)
        .on_blocking(EventKind::Disconnected, on_disconnected)
}

fn config_for(ctx: &HandlerContext, defaults: &IdentityConfig) -> IdentityConfig {
    ctx.plugin().get_or(ctx.bot(), defaults.clone())
}

async fn register(ctx: HandlerContext, defaults: Arc<IdentityConfig>, registry: NickRegistry) -> Result<(), BoxError> {
    let config = config_for(&ctx, &defaults);
    let bot = ctx.bot();

    let nick = if registry.claim(&config.nickname) {
        config.nickname.clone()
    } else {
        fallback_nick(&config, &registry, None)
    };
    ctx.plugin().set(bot, CurrentNick(nick.clone()));

    if let Some(password) = &bot.network().password {
        bot.send("PASS", &[password.as_str()])?;
    }
    bot.send("NICK", &[nick.as_str()])?;
    bot.send(
        "USER",
        &[config.username.as_str(), "0", "*", config.realname.as_str()],
    )?;

    info!(bot_id = bot.id(), nick = %nick, "Registering");
    Ok(())
}

async fn retry_nick(ctx: HandlerContext, defaults: Arc<IdentityConfig>, registry: NickRegistry) -> Result<(), BoxError> {
    let config = config_for(&ctx, &defaults);
    let bot = ctx.bot();

    // 433 <current> <rejected> :Nickname is already in use
    let rejected = match ctx.message().and_then(|m| m.arg(1)) {
        Some(nick) => nick.to_string(),
        None => match current_nick(bot) {
            Some(nick) => nick,
            None => config.nickname.clone(),
        },
    };
    registry.release(&rejected);

    let nick = fallback_nick(&config, &registry, Some(&rejected));
    ctx.plugin().set(bot, CurrentNick(nick.clone()));
    warn!(bot_id = bot.id(), rejected = %rejected, nick = %nick, "Nickname in use, retrying");

    bot.send("NICK", &[nick.as_str()])?;
    Ok(())
}

async fn release(ctx: HandlerContext, registry: NickRegistry) -> Result<(), BoxError> {
    if let Some(nick) = current_nick(ctx.bot()) {
        registry.release(&nick);
    }
    Ok(())
}

/// Picks and claims a nickname other than `rejected`.
///
/// The backup nickname wins when it is free; otherwise the primary nickname
/// gets a random alphanumeric suffix.
fn fallback_nick(config: &IdentityConfig, registry: &NickRegistry, rejected: Option<&str>) -> String {
    let is_rejected = |nick: &str| rejected.is_some_and(|r| r.eq_ignore_ascii_case(nick));

    if let Some(backup) = &config.backup_nickname {
        if !is_rejected(backup) && registry.claim(backup) {
            return backup.clone();
        }
    }

    let mut candidate = suffixed(&config.nickname);
    for _ in 0..MAX_SUFFIX_ATTEMPTS {
        if !is_rejected(&candidate) && registry.claim(&candidate) {
            break;
        }
        candidate = suffixed(&config.nickname);
    }
    candidate
}

fn suffixed(nick: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{nick}_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::{Bot, BotConfig};
    use crate::testing::{Peer, connected_bot};
    use courier_core::Network;
    use courier_transport::memory_pair;

    fn config() -> IdentityConfig {
        IdentityConfig {
            nickname: "relay".to_string(),
            backup_nickname: Some("relay-backup".to_string()),
            username: "relayuser".to_string(),
            realname: "Relay Bot".to_string(),
        }
    }

    #[tokio::test]
    async fn test_registers_on_connect() {
        let (bot, mut peer, _task) =
            connected_bot(BotConfig::default(), vec![Arc::new(identity_plugin(config()))]).await;

        assert_eq!(peer.next_line().await.as_deref(), Some("NICK relay"));
        assert_eq!(peer.next_line().await.as_deref(), Some("USER relayuser 0 * :Relay Bot"));
        assert_eq!(current_nick(&bot).as_deref(), Some("relay"));
    }

    #[tokio::test]
    async fn test_sends_pass_first_when_network_has_password() {
        let (connector, mut acceptor) = memory_pair();
        let network = Network::new("irc.example.org", 6667).with_password("hunter2");
        let bot = Bot::new(network, Arc::new(connector), BotConfig::default());
        bot.register_plugin(Arc::new(identity_plugin(config())));

        let _task = bot.connect().await.unwrap();
        let (_, stream) = acceptor.accept().await.unwrap();
        let mut peer = Peer::new(stream);

        assert_eq!(peer.next_line().await.as_deref(), Some("PASS hunter2"));
        assert_eq!(peer.next_line().await.as_deref(), Some("NICK relay"));
    }

    #[tokio::test]
    async fn test_per_bot_override() {
        let (connector, mut acceptor) = memory_pair();
        let bot = Bot::new(
            Network::new("irc.example.org", 6667),
            Arc::new(connector),
            BotConfig::default(),
        );
        IdentityConfig {
            nickname: "special".to_string(),
            ..config()
        }
        .apply_to(&bot);
        bot.register_plugin(Arc::new(identity_plugin(config())));

        let _task = bot.connect().await.unwrap();
        let (_, stream) = acceptor.accept().await.unwrap();
        let mut peer = Peer::new(stream);
        assert_eq!(peer.next_line().await.as_deref(), Some("NICK special"));
    }

    #[tokio::test]
    async fn test_nick_in_use_switches_to_backup_then_suffix() {
        let (bot, mut peer, _task) =
            connected_bot(BotConfig::default(), vec![Arc::new(identity_plugin(config()))]).await;
        peer.expect_line("USER").await;

        peer.send(":irc.example.org 433 * relay :Nickname is already in use").await;
        assert_eq!(peer.next_line().await.as_deref(), Some("NICK relay-backup"));

        peer.send(":irc.example.org 433 * relay-backup :Nickname is already in use").await;
        let retry = peer.next_line().await.unwrap();
        let nick = retry.strip_prefix("NICK relay_").unwrap();
        assert_eq!(nick.len(), SUFFIX_LEN);
        assert!(nick.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(current_nick(&bot), retry.strip_prefix("NICK ").map(str::to_string));
    }

    #[tokio::test]
    async fn test_bots_never_share_a_nick() {
        let registry = NickRegistry::new();
        let plugin = Arc::new(identity_plugin_with_registry(config(), registry.clone()));

        let (first, mut first_peer, _t1) = connected_bot(BotConfig::default(), vec![Arc::clone(&plugin)]).await;
        let (second, mut second_peer, _t2) = connected_bot(BotConfig::default(), vec![Arc::clone(&plugin)]).await;

        assert_eq!(first_peer.next_line().await.as_deref(), Some("NICK relay"));
        assert_eq!(second_peer.next_line().await.as_deref(), Some("NICK relay-backup"));
        assert_ne!(current_nick(&first), current_nick(&second));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_releases_claim() {
        let registry = NickRegistry::new();
        let plugin = Arc::new(identity_plugin_with_registry(config(), registry.clone()));
        let (_bot, mut peer, task) = connected_bot(BotConfig::default(), vec![plugin]).await;

        assert!(registry.is_claimed("RELAY"));
        peer.close().await;
        task.await.unwrap().unwrap();
        assert!(!registry.is_claimed("relay"));
    }

    #[test]
    fn test_fallback_skips_rejected_backup() {
        let registry = NickRegistry::new();
        let nick = fallback_nick(&config(), &registry, Some("RELAY-BACKUP"));
        assert!(nick.starts_with("relay_"));
        assert!(registry.is_claimed(&nick));
    }
}
