//! Channel proxies.
//!
//! A [`ChannelProxy`] mediates all traffic for one channel on one bot. It sends
//! `JOIN` at most once per bot lifetime, never before the bot is ready, and
//! sends `PRIVMSG` only after the server has echoed the `JOIN` back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use courier_core::Channel;

use crate::bot::{Bot, BotInner};
use crate::error::{BotError, BotResult};
use crate::plugin::builtin::ready::{ReadySignal, ready_signal};

struct ProxyInner {
    bot: Weak<BotInner>,
    channel: Channel,
    join_sent: AtomicBool,
    join_lock: AsyncMutex<()>,
    confirmed: ReadySignal,
}

/// Per-(bot, channel) handle. Cheap to clone.
///
/// The proxy holds only a weak reference to its bot; once the bot is gone
/// every operation fails with [`BotError::Closed`].
#[derive(Clone)]
pub struct ChannelProxy {
    inner: Arc<ProxyInner>,
}

impl ChannelProxy {
    pub(crate) fn new(bot: Weak<BotInner>, channel: Channel) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                bot,
                channel,
                join_sent: AtomicBool::new(false),
                join_lock: AsyncMutex::new(()),
                confirmed: ReadySignal::new(),
            }),
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.inner.channel
    }

    /// Whether `JOIN` has been sent. Never reset once set.
    pub fn join_sent(&self) -> bool {
        self.inner.join_sent.load(Ordering::Acquire)
    }

    /// Whether the server has confirmed the `JOIN`.
    pub fn is_joined(&self) -> bool {
        self.inner.confirmed.is_set()
    }

    /// Called by the bot's read loop for every `JOIN` naming this channel.
    pub(crate) fn confirm(&self, bot_id: u64) {
        if !self.inner.confirmed.is_set() {
            info!(bot_id, channel = %self.inner.channel, "Joined");
            self.inner.confirmed.set();
        }
    }

    /// The owning bot, if it is still alive.
    pub fn bot(&self) -> BotResult<Bot> {
        self.inner.bot.upgrade().map(Bot::from_inner).ok_or(BotError::Closed)
    }

    /// Returns `true` if both handles refer to the same proxy.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Joins the channel unless already joined.
    ///
    /// Waits for the bot to become ready first, then sends `JOIN` unless an
    /// earlier call already did. Concurrent callers queue behind the first.
    /// With `wait`, every caller also waits until the server has echoed the
    /// `JOIN` back, however long ago it was sent.
    pub async fn join(&self, wait: bool) -> BotResult<()> {
        if !self.join_sent() {
            self.send_join().await?;
        }
        if !wait || self.is_joined() {
            return Ok(());
        }

        let bot = self.bot()?;
        tokio::select! {
            _ = bot.closed() => Err(BotError::Closed),
            _ = self.inner.confirmed.wait() => Ok(()),
        }
    }

    async fn send_join(&self) -> BotResult<()> {
        let _guard = self.inner.join_lock.lock().await;
        if self.join_sent() {
            return Ok(());
        }

        let bot = self.bot()?;
        let ready = ready_signal(&bot);
        tokio::select! {
            _ = bot.closed() => return Err(BotError::Closed),
            _ = ready.wait() => {}
        }

        let channel = &self.inner.channel;
        match &channel.password {
            Some(password) => bot.send("JOIN", &[channel.name.as_str(), password.as_str()])?,
            None => bot.send("JOIN", &[channel.name.as_str()])?,
        }
        self.inner.join_sent.store(true, Ordering::Release);
        debug!(bot_id = bot.id(), channel = %channel, "Sent JOIN");
        Ok(())
    }

    /// Joins if needed, then sends `PRIVMSG`.
    pub async fn private_message(&self, text: &str) -> BotResult<()> {
        self.join(true).await?;
        self.bot()?.send("PRIVMSG", &[self.inner.channel.name.as_str(), text])
    }

    /// Sends `NOTICE` without joining.
    pub fn notice(&self, text: &str) -> BotResult<()> {
        self.bot()?.send("NOTICE", &[self.inner.channel.name.as_str(), text])
    }
}

impl std::fmt::Debug for ChannelProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelProxy")
            .field("channel", &self.inner.channel)
            .field("join_sent", &self.join_sent())
            .field("joined", &self.is_joined())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::BotConfig;
    use crate::plugin::builtin::ready::ready_plugin;
    use crate::testing::{connected_bot, idle_bot};
    use std::time::Duration;

    #[tokio::test]
    async fn test_join_twice_sends_one_join() {
        let (bot, mut peer, _task) = connected_bot(BotConfig::default(), Vec::new()).await;
        ready_signal(&bot).set();

        let proxy = bot.channel(&Channel::new("#notices"));
        proxy.join(false).await.unwrap();
        proxy.join(false).await.unwrap();
        bot.send_raw("PING sentinel").unwrap();

        assert_eq!(peer.next_line().await.as_deref(), Some("JOIN #notices"));
        assert_eq!(peer.next_line().await.as_deref(), Some("PING sentinel"));
    }

    #[tokio::test]
    async fn test_join_waits_for_readiness() {
        let (bot, mut peer, _task) =
            connected_bot(BotConfig::default(), vec![Arc::new(ready_plugin())]).await;

        let proxy = bot.channel(&Channel::new("#ops").with_password("key"));
        let join = tokio::spawn({
            let proxy = proxy.clone();
            async move { proxy.join(false).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        bot.send_raw("PING before-ready").unwrap();
        assert_eq!(peer.next_line().await.as_deref(), Some("PING before-ready"));
        assert!(!proxy.join_sent());

        peer.send(":irc.example.org 376 courier :End of /MOTD command.").await;
        assert_eq!(peer.next_line().await.as_deref(), Some("JOIN #ops key"));
        join.await.unwrap().unwrap();
        assert!(proxy.join_sent());
        assert!(!proxy.is_joined());
    }

    #[tokio::test]
    async fn test_join_wait_matches_channel_case_insensitively() {
        let (bot, mut peer, _task) = connected_bot(BotConfig::default(), Vec::new()).await;
        ready_signal(&bot).set();

        let proxy = bot.channel(&Channel::new("#Builds"));
        let join = tokio::spawn({
            let proxy = proxy.clone();
            async move { proxy.join(true).await }
        });

        assert_eq!(peer.next_line().await.as_deref(), Some("JOIN #Builds"));
        peer.send(":someone!u@h JOIN #other").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!join.is_finished());

        peer.send(":courier!u@h JOIN :#builds").await;
        join.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_private_message_joins_first() {
        let (bot, mut peer, _task) = connected_bot(BotConfig::default(), Vec::new()).await;
        ready_signal(&bot).set();

        let proxy = bot.channel(&Channel::new("#notices"));
        let send = tokio::spawn({
            let proxy = proxy.clone();
            async move { proxy.private_message("build passed").await }
        });

        assert_eq!(peer.next_line().await.as_deref(), Some("JOIN #notices"));
        peer.send(":courier!u@h JOIN #notices").await;
        send.await.unwrap().unwrap();
        assert_eq!(
            peer.next_line().await.as_deref(),
            Some("PRIVMSG #notices :build passed")
        );
    }

    #[tokio::test]
    async fn test_notice_does_not_join() {
        let (bot, mut peer, _task) = connected_bot(BotConfig::default(), Vec::new()).await;
        let proxy = bot.channel(&Channel::new("#notices"));

        proxy.notice("heads up").unwrap();
        assert_eq!(
            peer.next_line().await.as_deref(),
            Some("NOTICE #notices :heads up")
        );
        assert!(!proxy.join_sent());
    }

    #[tokio::test]
    async fn test_join_fails_when_bot_closes() {
        let bot = idle_bot();
        let proxy = bot.channel(&Channel::new("#notices"));
        let join = tokio::spawn({
            let proxy = proxy.clone();
            async move { proxy.join(true).await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        bot.close();
        assert!(matches!(join.await.unwrap(), Err(BotError::Closed)));
    }

    #[tokio::test]
    async fn test_proxy_outliving_bot_is_closed() {
        let proxy = idle_bot().channel(&Channel::new("#gone"));
        assert!(matches!(proxy.bot(), Err(BotError::Closed)));
        assert!(matches!(proxy.notice("x"), Err(BotError::Closed)));
    }

    #[tokio::test]
    async fn test_waiting_join_after_unconfirmed_join_keeps_waiting() {
        let (bot, mut peer, _task) = connected_bot(BotConfig::default(), Vec::new()).await;
        ready_signal(&bot).set();
        let proxy = bot.channel(&Channel::new("#quiet"));

        let first = tokio::time::timeout(Duration::from_millis(50), proxy.join(true)).await;
        assert!(first.is_err());
        assert_eq!(peer.next_line().await.as_deref(), Some("JOIN #quiet"));

        let second = tokio::spawn({
            let proxy = proxy.clone();
            async move { proxy.join(true).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!second.is_finished());
        assert!(proxy.join_sent());
        assert!(!proxy.is_joined());

        peer.send(":courier!u@h JOIN #quiet").await;
        second.await.unwrap().unwrap();
        assert!(proxy.is_joined());

        bot.send_raw("PING sentinel").unwrap();
        assert_eq!(peer.next_line().await.as_deref(), Some("PING sentinel"));
    }

    #[tokio::test]
    async fn test_non_waiting_join_does_not_confirm_for_waiters() {
        let (bot, mut peer, _task) = connected_bot(BotConfig::default(), Vec::new()).await;
        ready_signal(&bot).set();
        let proxy = bot.channel(&Channel::new("#quiet"));

        proxy.join(false).await.unwrap();
        assert_eq!(peer.next_line().await.as_deref(), Some("JOIN #quiet"));

        let waiting = tokio::time::timeout(Duration::from_millis(50), proxy.private_message("hello there")).await;
        assert!(waiting.is_err());

        bot.send_raw("PING sentinel").unwrap();
        assert_eq!(peer.next_line().await.as_deref(), Some("PING sentinel"));
    }
}
