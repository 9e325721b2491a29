//! Process wiring: config, logging, connector, manager and queue bridge.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use courier_runtime::{CourierRuntime, MemoryQueue};
//!
//! let queue = Arc::new(MemoryQueue::new());
//! let runtime = CourierRuntime::builder()
//!     .config_file("config/courier.toml")
//!     .build(queue)?;
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use courier_core::BoxedConnector;
use courier_framework::Manager;
use courier_framework::plugin::builtin::{identity_plugin, logging_plugin, ping_plugin, rate_limit_plugin};
use courier_transport::TcpConnector;

use crate::bridge::{BridgeConfig, QueueBridge};
use crate::config::{ConfigLoader, ConfigResult, CourierConfig};
use crate::error::RuntimeResult;
use crate::logging;
use crate::queue::BoxedQueue;

const SHUTDOWN_REASON: &str = "Relay shutting down";

/// A configured relay: one [`Manager`] fed by one queue.
pub struct CourierRuntime {
    config: CourierConfig,
    manager: Manager,
    queue: BoxedQueue,
}

impl CourierRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Initializes logging and connects over TCP (and TLS where requested).
    pub fn from_config(config: &CourierConfig, queue: BoxedQueue) -> Self {
        logging::init_from_config(&config.logging);
        let connector = Arc::new(TcpConnector::new(config.bot.connect_timeout()));
        Self::with_connector(config, queue, connector)
    }

    /// Builds the runtime around an existing connector. Logging is left as
    /// is.
    pub fn with_connector(config: &CourierConfig, queue: BoxedQueue, connector: BoxedConnector) -> Self {
        let manager = Manager::new(connector, config.bot.to_bot_config());
        manager.register_plugin(Arc::new(identity_plugin(config.identity.to_identity_config())));
        manager.register_plugin(Arc::new(ping_plugin()));
        manager.register_plugin(Arc::new(rate_limit_plugin(config.rate_limit.to_rate_limit_config())));
        manager.register_plugin(Arc::new(logging_plugin()));

        info!(
            nickname = %config.identity.nickname,
            log_level = %config.logging.level,
            plugins = manager.plugins().len(),
            "Runtime initialized"
        );

        Self {
            config: config.clone(),
            manager,
            queue,
        }
    }

    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    /// The manager, for registering extra plugins before [`run`](Self::run).
    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    pub fn queue(&self) -> &BoxedQueue {
        &self.queue
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!("Courier is running. Press Ctrl+C to stop.");
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs until `shutdown` resolves or the queue closes, then quits every
    /// bot.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let cancel = CancellationToken::new();
        let bridge = QueueBridge::new(
            Arc::clone(&self.queue),
            self.manager.clone(),
            BridgeConfig::from(&self.config.bridge),
        );
        let bridge = bridge.run(cancel.clone());
        tokio::pin!(bridge);

        let result = tokio::select! {
            result = &mut bridge => result,
            _ = shutdown => {
                cancel.cancel();
                bridge.await
            }
        };

        self.manager
            .shutdown(SHUTDOWN_REASON, self.config.bridge.shutdown_grace())
            .await;
        info!("Runtime stopped");

        Ok(result?)
    }
}

/// Waits for Ctrl+C, or SIGTERM on Unix.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => error!(error = %e, "Cannot listen for SIGTERM"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Cannot listen for Ctrl+C, shutting down"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Loads configuration, then builds a [`CourierRuntime`].
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir().with_user_config_dir(),
        }
    }

    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g. "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: CourierConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    pub fn build(self, queue: BoxedQueue) -> ConfigResult<CourierRuntime> {
        let config = self.config_loader.load()?;
        Ok(CourierRuntime::from_config(&config, queue))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{MemoryQueue, Queue};
    use crate::testing::{Script, scripted_server};
    use courier_core::{Channel, Network};
    use courier_transport::memory_pair;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    fn test_config() -> CourierConfig {
        let mut config = CourierConfig::default();
        config.rate_limit.min_interval_ms = 0;
        config.rate_limit.max_jitter_ms = 0;
        config.bridge.shutdown_grace_ms = 1000;
        config
    }

    #[tokio::test]
    async fn test_end_to_end_delivery() {
        let (connector, acceptor) = memory_pair();
        let mut server = scripted_server(acceptor, Script::default());
        let queue = Arc::new(MemoryQueue::new());
        let runtime = CourierRuntime::with_connector(&test_config(), queue.clone(), Arc::new(connector.clone()));

        queue
            .push(
                r##"{"type": "message",
                     "channel": {"host": "irc.example.org", "port": 6667, "ssl": false, "channel": "#notices"},
                     "payload": {"msg": "build passed"}}"##
                    .into(),
            )
            .await
            .unwrap();

        let stop = CancellationToken::new();
        let run = {
            let stop = stop.clone();
            async move { runtime.run_until(stop.cancelled_owned()).await }
        };
        let run = tokio::spawn(run);

        let (network, nick) = server.expect("NICK").await;
        assert_eq!(network, Network::new("irc.example.org", 6667));
        assert_eq!(nick, "NICK courier");
        server.expect("USER courier 0 * :Courier relay").await;
        server.expect("JOIN #notices").await;
        let (_, line) = server.expect("PRIVMSG").await;
        assert_eq!(line, "PRIVMSG #notices :build passed");

        assert_eq!(connector.connections(), vec![Network::new("irc.example.org", 6667)]);

        stop.cancel();
        let (_, quit) = server.expect("QUIT").await;
        assert_eq!(quit, format!("QUIT :{SHUTDOWN_REASON}"));
        assert!(run.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_server_ping_answered() {
        let (connector, mut acceptor) = memory_pair();
        let queue = Arc::new(MemoryQueue::new());
        let runtime = CourierRuntime::with_connector(&test_config(), queue.clone(), Arc::new(connector));

        let proxy = runtime
            .manager()
            .resolve(&Network::new("irc.example.org", 6667), &Channel::new("#c"));
        let (_, stream) = acceptor.accept().await.unwrap();
        let (read, mut write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();

        write.write_all(b"PING :token-1\r\n").await.unwrap();
        let pong = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let line = lines.next_line().await.unwrap().unwrap();
                if line.starts_with("PONG") {
                    return line;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(pong, "PONG token-1");
        assert!(!proxy.is_joined());
    }

    #[tokio::test]
    async fn test_closed_queue_stops_runtime() {
        let (connector, acceptor) = memory_pair();
        let _server = scripted_server(acceptor, Script::default());
        let queue = Arc::new(MemoryQueue::new());
        let runtime = CourierRuntime::with_connector(&test_config(), queue.clone(), Arc::new(connector));

        queue.close();
        let finished = tokio::time::timeout(Duration::from_secs(5), runtime.run_until(std::future::pending())).await;
        assert!(matches!(finished, Ok(Ok(()))));
    }
}
