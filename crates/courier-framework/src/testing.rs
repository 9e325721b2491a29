//! Scripted peers for unit tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

use courier_core::Network;
use courier_transport::memory_pair;

use crate::bot::{Bot, BotConfig, ConnectionTask};
use crate::plugin::Plugin;

const LINE_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn test_network() -> Network {
    Network::new("irc.example.org", 6667)
}

/// A bot that is never connected.
pub(crate) fn idle_bot() -> Bot {
    let (connector, _acceptor) = memory_pair();
    Bot::new(test_network(), Arc::new(connector), BotConfig::default())
}

/// A bot connected to a scripted peer, with `plugins` registered before
/// `connected` fires.
pub(crate) async fn connected_bot(config: BotConfig, plugins: Vec<Arc<Plugin>>) -> (Bot, Peer, ConnectionTask) {
    let (connector, mut acceptor) = memory_pair();
    let bot = Bot::new(test_network(), Arc::new(connector), config);
    for plugin in plugins {
        bot.register_plugin(plugin);
    }

    let task = bot.connect().await.unwrap();
    let (_, stream) = acceptor.accept().await.unwrap();
    (bot, Peer::new(stream), task)
}

/// The server end of a bot's connection.
pub(crate) struct Peer {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl Peer {
    pub(crate) fn new(stream: DuplexStream) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Next line written by the bot, without CR-LF. `None` on EOF.
    pub(crate) async fn next_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let read = tokio::time::timeout(LINE_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a line")
            .expect("peer read failed");
        if read == 0 {
            return None;
        }
        assert!(line.ends_with("\r\n"), "line not CR-LF terminated: {line:?}");
        line.truncate(line.len() - 2);
        Some(line)
    }

    /// Reads lines until one starts with `prefix`.
    pub(crate) async fn expect_line(&mut self, prefix: &str) -> String {
        loop {
            match self.next_line().await {
                Some(line) if line.starts_with(prefix) => return line,
                Some(_) => continue,
                None => panic!("connection closed before a line starting with {prefix:?}"),
            }
        }
    }

    pub(crate) async fn send(&mut self, line: &str) {
        self.write_raw(format!("{line}\r\n").as_bytes()).await;
    }

    pub(crate) async fn write_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
        self.writer.flush().await.unwrap();
    }

    /// Closes the peer's sending side; the bot sees end-of-stream.
    pub(crate) async fn close(&mut self) {
        self.writer.shutdown().await.unwrap();
    }
}
