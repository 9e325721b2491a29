//! Moves queued messages into channels.
//!
//! The [`QueueBridge`] drains the queue on start, then sleeps on the queue's
//! push notification and drains again. It never polls on a timer.
//!
//! Each entry is routed to a delivery lane keyed by network and channel. A
//! lane is a task fed through a bounded channel: entries for one channel go
//! out in queue order, a slow channel does not hold up the others, and a full
//! lane holds up the drain loop. A lane resolves its channel through the
//! [`Manager`] on every attempt, so a failed attempt on a dead bot is retried
//! on a fresh one. Lanes close after sitting idle and reopen on demand.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use courier_core::{Channel, Network};
use courier_framework::{BotError, Manager};

use crate::config::{BridgeSettings, RetryConfig};
use crate::entry::QueueEntry;
use crate::error::{QueueError, QueueResult};
use crate::queue::BoxedQueue;

/// Tunables for [`QueueBridge`].
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Messages buffered per lane.
    pub channel_backlog: usize,
    /// Upper bound for one attempt, readiness and join confirmation included.
    pub join_timeout: Duration,
    /// How long a lane waits for its next message before closing.
    pub lane_idle_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::from(&BridgeSettings::default())
    }
}

impl From<&BridgeSettings> for BridgeConfig {
    fn from(settings: &BridgeSettings) -> Self {
        Self {
            channel_backlog: settings.channel_backlog,
            join_timeout: settings.join_timeout(),
            lane_idle_timeout: settings.lane_idle_timeout(),
            retry: settings.retry.clone(),
        }
    }
}

#[derive(Debug, Error)]
enum DeliveryError {
    #[error(transparent)]
    Bot(#[from] BotError),

    #[error("channel not joined within {0:?}")]
    Timeout(Duration),
}

type LaneKey = (Network, String);

/// Drains a [`Queue`](crate::queue::Queue) into a [`Manager`].
pub struct QueueBridge {
    queue: BoxedQueue,
    manager: Manager,
    config: Arc<BridgeConfig>,
    lanes: HashMap<LaneKey, mpsc::Sender<String>>,
    tasks: JoinSet<()>,
}

impl QueueBridge {
    pub fn new(queue: BoxedQueue, manager: Manager, config: BridgeConfig) -> Self {
        Self {
            queue,
            manager,
            config: Arc::new(config),
            lanes: HashMap::new(),
            tasks: JoinSet::new(),
        }
    }

    /// Runs until `shutdown` fires or the queue closes.
    ///
    /// On shutdown, undelivered messages are abandoned. When the queue closes,
    /// lanes finish their backlog before this returns.
    pub async fn run(mut self, shutdown: CancellationToken) -> QueueResult<()> {
        info!("Queue bridge started");
        let result = self.drain_loop(&shutdown).await;

        self.lanes.clear();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined
                && e.is_panic()
            {
                error!(error = %e, "Delivery lane panicked");
            }
        }

        match &result {
            Ok(()) => info!("Queue bridge stopped"),
            Err(e) => error!(error = %e, "Queue bridge failed"),
        }
        result
    }

    async fn drain_loop(&mut self, shutdown: &CancellationToken) -> QueueResult<()> {
        loop {
            self.drain(shutdown).await?;
            if shutdown.is_cancelled() {
                return Ok(());
            }

            let waited = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                waited = self.queue.wait() => waited,
            };
            match waited {
                Ok(()) => {}
                Err(QueueError::Closed) => {
                    info!("Queue closed");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Pops entries until the queue is empty.
    async fn drain(&mut self, shutdown: &CancellationToken) -> QueueResult<()> {
        let mut drained = 0usize;
        while !shutdown.is_cancelled() {
            let Some(raw) = self.queue.pop().await? else {
                break;
            };
            drained += 1;
            self.dispatch(&raw, shutdown).await;
        }

        if drained > 0 {
            debug!(entries = drained, "Drained queue");
        }
        Ok(())
    }

    async fn dispatch(&mut self, raw: &str, shutdown: &CancellationToken) {
        let message = match QueueEntry::parse(raw) {
            Ok(QueueEntry::Message(message)) => message,
            Ok(QueueEntry::Cnc(cnc)) => {
                info!(fields = ?cnc.fields, "Ignoring command-and-control entry");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Dropping queue entry");
                return;
            }
        };

        let routed = message
            .route()
            .and_then(|(network, channel)| Ok((network, channel, message.text()?.to_string())));
        match routed {
            Ok((network, channel, text)) => self.enqueue(network, channel, text, shutdown).await,
            Err(e) => warn!(error = %e, "Dropping queue entry"),
        }
    }

    /// Hands `text` to the lane for its channel, waiting while the lane is full.
    async fn enqueue(&mut self, network: Network, channel: Channel, text: String, shutdown: &CancellationToken) {
        let key = (network.clone(), channel.key());
        let mut text = text;

        // A failed send means the lane went idle and closed; open a new one.
        for _ in 0..2 {
            let lane = self.lane(&key, &network, &channel, shutdown);
            match lane.send(text).await {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => {
                    self.lanes.remove(&key);
                    text = returned;
                }
            }
            if shutdown.is_cancelled() {
                return;
            }
        }
        warn!(network = %network, channel = %channel, "Dropping message, no delivery lane");
    }

    fn lane(
        &mut self,
        key: &LaneKey,
        network: &Network,
        channel: &Channel,
        shutdown: &CancellationToken,
    ) -> mpsc::Sender<String> {
        if let Some(tx) = self.lanes.get(key)
            && !tx.is_closed()
        {
            return tx.clone();
        }

        while self.tasks.try_join_next().is_some() {}
        self.lanes.retain(|_, tx| !tx.is_closed());

        let (tx, rx) = mpsc::channel(self.config.channel_backlog);
        let lane = Lane {
            manager: self.manager.clone(),
            network: network.clone(),
            channel: channel.clone(),
            config: Arc::clone(&self.config),
            shutdown: shutdown.clone(),
        };
        self.tasks.spawn(lane.run(rx));
        self.lanes.insert(key.clone(), tx.clone());
        debug!(network = %network, channel = %channel, "Opened delivery lane");
        tx
    }

    /// Number of open delivery lanes.
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }
}

struct Lane {
    manager: Manager,
    network: Network,
    channel: Channel,
    config: Arc<BridgeConfig>,
    shutdown: CancellationToken,
}

impl Lane {
    async fn run(self, mut rx: mpsc::Receiver<String>) {
        loop {
            let text = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = rx.recv() => match next {
                    Some(text) => text,
                    None => break,
                },
                _ = tokio::time::sleep(self.config.lane_idle_timeout) => {
                    // Refuse new sends, then finish whatever slipped in.
                    rx.close();
                    while let Ok(text) = rx.try_recv() {
                        if !self.deliver(&text).await {
                            break;
                        }
                    }
                    debug!(network = %self.network, channel = %self.channel, "Delivery lane idle");
                    break;
                }
            };
            if !self.deliver(&text).await {
                break;
            }
        }
        debug!(network = %self.network, channel = %self.channel, "Delivery lane closed");
    }

    /// Returns `false` if shutdown interrupted delivery.
    async fn deliver(&self, text: &str) -> bool {
        let mut attempt = 0u32;
        loop {
            let outcome = tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                outcome = self.attempt(text) => outcome,
            };
            let failure = match outcome {
                Ok(()) => {
                    debug!(network = %self.network, channel = %self.channel, "Message delivered");
                    return true;
                }
                Err(e) => e,
            };

            attempt += 1;
            if attempt > self.config.retry.max_retries {
                error!(
                    network = %self.network,
                    channel = %self.channel,
                    attempts = attempt,
                    error = %failure,
                    "Giving up on message"
                );
                return true;
            }

            let delay = self.config.retry.delay_for(attempt);
            warn!(
                network = %self.network,
                channel = %self.channel,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Delivery failed, retrying"
            );
            tokio::select! {
                _ = self.shutdown.cancelled() => return false,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn attempt(&self, text: &str) -> Result<(), DeliveryError> {
        let proxy = self.manager.resolve(&self.network, &self.channel);
        match tokio::time::timeout(self.config.join_timeout, proxy.private_message(text)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(DeliveryError::Timeout(self.config.join_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{MemoryQueue, Queue};
    use crate::testing::{Script, scripted_server};
    use courier_framework::BotConfig;
    use courier_framework::plugin::builtin::{IdentityConfig, identity_plugin};
    use courier_transport::{MemoryConnector, memory_pair};
    use tokio::task::JoinHandle;

    fn entry(host: &str, channel: &str, msg: &str) -> String {
        serde_json::json!({
            "type": "message",
            "channel": {"host": host, "port": 6667, "ssl": false, "channel": channel},
            "payload": {"msg": msg},
        })
        .to_string()
    }

    fn fast_config() -> BridgeConfig {
        BridgeConfig {
            channel_backlog: 8,
            join_timeout: Duration::from_secs(5),
            lane_idle_timeout: Duration::from_secs(60),
            retry: RetryConfig {
                max_retries: 3,
                initial_delay_ms: 10,
                max_delay_ms: 50,
                backoff_multiplier: 2.0,
            },
        }
    }

    fn manager(connector: MemoryConnector) -> Manager {
        let manager = Manager::new(Arc::new(connector), BotConfig::default());
        manager.register_plugin(Arc::new(identity_plugin(IdentityConfig::default())));
        manager
    }

    fn start(
        queue: &Arc<MemoryQueue>,
        manager: &Manager,
        config: BridgeConfig,
    ) -> (CancellationToken, JoinHandle<QueueResult<()>>) {
        let shutdown = CancellationToken::new();
        let bridge = QueueBridge::new(queue.clone(), manager.clone(), config);
        let task = tokio::spawn(bridge.run(shutdown.clone()));
        (shutdown, task)
    }

    #[tokio::test]
    async fn test_catch_up_then_notification() {
        let (connector, acceptor) = memory_pair();
        let mut server = scripted_server(acceptor, Script::default());
        let manager = manager(connector);
        let queue = Arc::new(MemoryQueue::new());

        queue.push(entry("irc.example.org", "#notices", "queued before start")).await.unwrap();
        let (shutdown, task) = start(&queue, &manager, fast_config());

        let (_, line) = server.expect("PRIVMSG").await;
        assert_eq!(line, "PRIVMSG #notices :queued before start");

        queue.push(entry("irc.example.org", "#notices", "pushed later")).await.unwrap();
        let (_, line) = server.expect("PRIVMSG").await;
        assert_eq!(line, "PRIVMSG #notices :pushed later");

        shutdown.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_bad_entries_do_not_block() {
        let (connector, acceptor) = memory_pair();
        let mut server = scripted_server(acceptor, Script::default());
        let manager = manager(connector);
        let queue = Arc::new(MemoryQueue::new());

        queue.push("{not json".into()).await.unwrap();
        queue.push(r#"{"type": "cnc", "action": "reload"}"#.into()).await.unwrap();
        queue
            .push(r##"{"type": "message", "channel": {"channel": "#c"}, "payload": {"msg": "x"}}"##.into())
            .await
            .unwrap();
        queue.push(entry("irc.example.org", "#ops", "still delivered")).await.unwrap();

        let (shutdown, task) = start(&queue, &manager, fast_config());

        let (_, line) = server.expect("PRIVMSG").await;
        assert_eq!(line, "PRIVMSG #ops :still delivered");

        shutdown.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_channel_order_and_single_join() {
        let (connector, acceptor) = memory_pair();
        let mut server = scripted_server(acceptor, Script::default());
        let manager = manager(connector.clone());
        let queue = Arc::new(MemoryQueue::new());

        for i in 0..3 {
            queue.push(entry("irc.example.org", "#notices", &format!("message {i}"))).await.unwrap();
        }
        let (shutdown, task) = start(&queue, &manager, fast_config());

        server.expect("JOIN #notices").await;
        for i in 0..3 {
            let (_, line) = server.expect("PRIVMSG").await;
            assert_eq!(line, format!("PRIVMSG #notices :message {i}"));
        }
        shutdown.cancel();
        task.await.unwrap().unwrap();

        assert_eq!(connector.connections().len(), 1);
        assert!(server.drain_matching("JOIN").is_empty());
    }

    #[tokio::test]
    async fn test_refused_connect_is_retried() {
        let (connector, acceptor) = memory_pair();
        let mut server = scripted_server(acceptor, Script::default());
        connector.refuse_next(1);
        let manager = manager(connector.clone());
        let queue = Arc::new(MemoryQueue::new());

        queue.push(entry("irc.example.org", "#notices", "after retry")).await.unwrap();
        let (shutdown, task) = start(&queue, &manager, fast_config());

        let (network, line) = server.expect("PRIVMSG").await;
        assert_eq!(line, "PRIVMSG #notices :after retry");
        assert_eq!(network.address(), "irc.example.org:6667");
        assert_eq!(connector.connections().len(), 2);

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_gives_up_without_join_confirmation() {
        let (connector, acceptor) = memory_pair();
        let mut server = scripted_server(
            acceptor,
            Script {
                welcome: true,
                confirm_joins: false,
            },
        );
        let manager = manager(connector);
        let queue = Arc::new(MemoryQueue::new());

        let config = BridgeConfig {
            join_timeout: Duration::from_millis(500),
            retry: RetryConfig {
                max_retries: 0,
                ..fast_config().retry
            },
            ..fast_config()
        };

        queue.push(entry("irc.example.org", "#quiet", "never confirmed")).await.unwrap();
        queue.close();
        let (_, task) = start(&queue, &manager, config);

        // Queue closed: the bridge returns once the lane has given up.
        let finished = tokio::time::timeout(Duration::from_secs(5), task).await;
        assert!(matches!(finished, Ok(Ok(Ok(())))));

        server.expect("JOIN #quiet").await;
        assert!(server.drain_matching("PRIVMSG").is_empty());
    }

    #[tokio::test]
    async fn test_closed_queue_finishes_backlog() {
        let (connector, acceptor) = memory_pair();
        let mut server = scripted_server(acceptor, Script::default());
        let manager = manager(connector);
        let queue = Arc::new(MemoryQueue::new());

        queue.push(entry("irc.example.org", "#a", "first build")).await.unwrap();
        queue.push(entry("irc.example.org", "#b", "second build")).await.unwrap();
        queue.close();

        let (_, task) = start(&queue, &manager, fast_config());
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap().unwrap();

        let mut delivered = vec![server.expect("PRIVMSG").await.1, server.expect("PRIVMSG").await.1];
        delivered.sort();
        assert_eq!(delivered, vec!["PRIVMSG #a :first build", "PRIVMSG #b :second build"]);
    }

    #[tokio::test]
    async fn test_retry_never_sends_before_join_confirmation() {
        let (connector, acceptor) = memory_pair();
        let mut server = scripted_server(
            acceptor,
            Script {
                welcome: true,
                confirm_joins: false,
            },
        );
        let manager = manager(connector);
        let queue = Arc::new(MemoryQueue::new());

        let config = BridgeConfig {
            join_timeout: Duration::from_millis(300),
            retry: RetryConfig {
                max_retries: 2,
                ..fast_config().retry
            },
            ..fast_config()
        };

        queue.push(entry("irc.example.org", "#quiet", "never joined")).await.unwrap();
        queue.close();
        let (_, task) = start(&queue, &manager, config);

        let finished = tokio::time::timeout(Duration::from_secs(10), task).await;
        assert!(matches!(finished, Ok(Ok(Ok(())))));

        server.expect("JOIN #quiet").await;
        let lines = server.drain_matching("");
        assert!(lines.iter().all(|line| !line.starts_with("PRIVMSG")), "{lines:?}");
        assert!(lines.iter().all(|line| !line.starts_with("JOIN")), "{lines:?}");
    }

    #[tokio::test]
    async fn test_idle_lane_closes() {
        let (connector, _acceptor) = memory_pair();
        let lane = Lane {
            manager: manager(connector),
            network: Network::new("irc.example.org", 6667),
            channel: Channel::new("#idle"),
            config: Arc::new(BridgeConfig {
                lane_idle_timeout: Duration::from_millis(20),
                ..fast_config()
            }),
            shutdown: CancellationToken::new(),
        };
        let (tx, rx) = mpsc::channel(1);

        let finished = tokio::time::timeout(Duration::from_secs(2), tokio::spawn(lane.run(rx))).await;
        assert!(matches!(finished, Ok(Ok(()))));
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn test_channel_reused_after_lane_idles() {
        let (connector, acceptor) = memory_pair();
        let mut server = scripted_server(acceptor, Script::default());
        let manager = manager(connector.clone());
        let queue = Arc::new(MemoryQueue::new());
        let config = BridgeConfig {
            lane_idle_timeout: Duration::from_millis(50),
            ..fast_config()
        };
        let (shutdown, task) = start(&queue, &manager, config);

        queue.push(entry("irc.example.org", "#notices", "first build")).await.unwrap();
        assert_eq!(server.expect("PRIVMSG").await.1, "PRIVMSG #notices :first build");

        tokio::time::sleep(Duration::from_millis(200)).await;
        queue.push(entry("irc.example.org", "#notices", "second build")).await.unwrap();
        assert_eq!(server.expect("PRIVMSG").await.1, "PRIVMSG #notices :second build");

        assert_eq!(connector.connections().len(), 1);
        assert!(server.drain_matching("JOIN").is_empty());

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }
}
