//! A single connection to one IRC network.
//!
//! A [`Bot`] owns one transport and runs two tasks over it once connected:
//!
//! - the **read loop** splits the byte stream into lines, parses each one and
//!   emits `message` followed by the command-specific event;
//! - the **write loop** takes one queued line at a time, emits `before_write`
//!   (whose blocking handlers may delay it), writes it out and only then takes
//!   the next.
//!
//! Both loops share a cancellation token. The read loop cancels it when the
//! stream ends or fails, which abandons whatever the write loop is doing,
//! including a rate-limit sleep in progress.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use courier_core::{
    BoxedConnector, BoxedStream, Channel, EventKind, Message, Metadata, Network, channel_key, encode,
};

use crate::bus::EventBus;
use crate::channel::ChannelProxy;
use crate::context::EventData;
use crate::error::{BotError, BotResult};
use crate::plugin::Plugin;

/// Default limit for unterminated input.
pub const DEFAULT_MAX_BUFFER: usize = 16 * 1024;

/// Bytes requested from the transport per read.
const READ_CHUNK_SIZE: usize = 4096;

static NEXT_BOT_ID: AtomicU64 = AtomicU64::new(1);

/// The read loop of a connected bot. Resolves when the connection ends.
pub type ConnectionTask = JoinHandle<BotResult<()>>;

/// Tunables for a single bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    /// Maximum bytes buffered without a line terminator before the peer is
    /// considered hostile.
    pub max_buffer: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            max_buffer: DEFAULT_MAX_BUFFER,
        }
    }
}

/// Connection state as the bot itself sees it.
///
/// Readiness is not a state here; it is tracked by the `ready` plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for BotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

pub(crate) struct BotInner {
    id: u64,
    network: Network,
    config: BotConfig,
    connector: BoxedConnector,
    bus: EventBus,
    metadata: Metadata,
    plugins: Mutex<Vec<Arc<Plugin>>>,
    channels: Mutex<HashMap<String, ChannelProxy>>,
    outbound: mpsc::UnboundedSender<String>,
    pending: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    state: Mutex<BotState>,
    cancel: CancellationToken,
}

/// A connection to one network. Cheap to clone.
#[derive(Clone)]
pub struct Bot {
    inner: Arc<BotInner>,
}

impl Bot {
    /// Creates a disconnected bot.
    pub fn new(network: Network, connector: BoxedConnector, config: BotConfig) -> Self {
        let (outbound, pending) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(BotInner {
                id: NEXT_BOT_ID.fetch_add(1, Ordering::Relaxed),
                network,
                config,
                connector,
                bus: EventBus::new(),
                metadata: Metadata::new(),
                plugins: Mutex::new(Vec::new()),
                channels: Mutex::new(HashMap::new()),
                outbound,
                pending: Mutex::new(Some(pending)),
                state: Mutex::new(BotState::Disconnected),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<BotInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<BotInner> {
        Arc::downgrade(&self.inner)
    }

    /// Process-unique identifier.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn network(&self) -> &Network {
        &self.inner.network
    }

    pub fn config(&self) -> &BotConfig {
        &self.inner.config
    }

    pub fn state(&self) -> BotState {
        *self.inner.state.lock()
    }

    /// The bot's event bus.
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Per-plugin metadata stored on this bot.
    pub fn metadata(&self) -> &Metadata {
        &self.inner.metadata
    }

    /// Returns `true` once the bot has been closed or its connection ended.
    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Resolves when the bot is closed or its connection ends.
    pub async fn closed(&self) {
        self.inner.cancel.cancelled().await;
    }

    // ─── Plugins ──────────────────────────────────────────────────────────────

    /// Merges `plugin`'s handlers into the bus.
    ///
    /// Returns `false` if this exact plugin is already registered.
    pub fn register_plugin(&self, plugin: Arc<Plugin>) -> bool {
        {
            let mut plugins = self.inner.plugins.lock();
            if plugins.iter().any(|p| Arc::ptr_eq(p, &plugin)) {
                return false;
            }
            plugins.push(Arc::clone(&plugin));
        }
        self.inner.bus.register(&plugin);
        debug!(bot_id = self.id(), plugin = %plugin.name(), "Registered plugin");
        true
    }

    /// Removes exactly the handlers `plugin` added.
    pub fn unregister_plugin(&self, plugin: &Arc<Plugin>) -> bool {
        {
            let mut plugins = self.inner.plugins.lock();
            let before = plugins.len();
            plugins.retain(|p| !Arc::ptr_eq(p, plugin));
            if plugins.len() == before {
                return false;
            }
        }
        self.inner.bus.unregister(plugin);
        debug!(bot_id = self.id(), plugin = %plugin.name(), "Unregistered plugin");
        true
    }

    pub fn plugins(&self) -> Vec<Arc<Plugin>> {
        self.inner.plugins.lock().clone()
    }

    // ─── Channels ─────────────────────────────────────────────────────────────

    /// Returns the proxy for `channel`, creating it on first reference.
    ///
    /// Proxies are keyed by lower-cased name; the first reference decides the
    /// name and key used on the wire.
    pub fn channel(&self, channel: &Channel) -> ChannelProxy {
        self.inner
            .channels
            .lock()
            .entry(channel.key())
            .or_insert_with(|| ChannelProxy::new(self.downgrade(), channel.clone()))
            .clone()
    }

    /// Every proxy created on this bot.
    pub fn channels(&self) -> Vec<ChannelProxy> {
        self.inner.channels.lock().values().cloned().collect()
    }

    // ─── Sending ──────────────────────────────────────────────────────────────

    /// Queues a command. Never waits beyond queue insertion.
    pub fn send<S: AsRef<str>>(&self, command: &str, args: &[S]) -> BotResult<()> {
        self.send_raw(encode(command, args))
    }

    /// Queues a raw line; a trailing line terminator is stripped and the
    /// writer appends CR-LF.
    pub fn send_raw(&self, line: impl Into<String>) -> BotResult<()> {
        if self.is_closed() {
            return Err(BotError::Closed);
        }
        let mut line = line.into();
        while line.ends_with(['\r', '\n']) {
            line.pop();
        }
        trace!(bot_id = self.id(), line = %line, "Queued");
        self.inner.outbound.send(line).map_err(|_| BotError::Closed)
    }

    /// Queues `QUIT`. The server closes the connection once it is written.
    pub fn quit(&self, reason: Option<&str>) -> BotResult<()> {
        match reason {
            Some(reason) => self.send("QUIT", &[reason]),
            None => self.send::<&str>("QUIT", &[]),
        }
    }

    /// Tears the connection down immediately.
    pub fn close(&self) {
        if !self.inner.cancel.is_cancelled() {
            debug!(bot_id = self.id(), "Closing");
            self.inner.cancel.cancel();
        }
    }

    /// Emits `event` on this bot's bus.
    pub async fn emit(&self, event: EventKind, data: EventData) {
        self.inner.bus.emit(self, event, data).await;
    }

    // ─── Connection ───────────────────────────────────────────────────────────

    /// Opens the transport, emits `connected` and starts both loops.
    ///
    /// Transport failures are returned to the caller and leave the bot
    /// disconnected, so `connect` may be retried. A bot whose connection has
    /// ended is spent and returns [`BotError::Closed`].
    pub async fn connect(&self) -> BotResult<ConnectionTask> {
        {
            let mut state = self.inner.state.lock();
            if *state != BotState::Disconnected {
                return Err(BotError::AlreadyConnected);
            }
            if self.is_closed() {
                return Err(BotError::Closed);
            }
            *state = BotState::Connecting;
        }

        let Some(outbound) = self.inner.pending.lock().take() else {
            *self.inner.state.lock() = BotState::Disconnected;
            return Err(BotError::Closed);
        };

        info!(bot_id = self.id(), network = %self.inner.network, "Connecting");
        let stream = match self.inner.connector.connect(&self.inner.network).await {
            Ok(stream) => stream,
            Err(e) => {
                *self.inner.pending.lock() = Some(outbound);
                *self.inner.state.lock() = BotState::Disconnected;
                return Err(e.into());
            }
        };

        *self.inner.state.lock() = BotState::Connected;
        info!(bot_id = self.id(), network = %self.inner.network, "Connected");

        let (reader, writer) = tokio::io::split(stream);
        self.emit(EventKind::Connected, EventData::empty()).await;

        let write_task = tokio::spawn(self.clone().write_loop(writer, outbound));
        Ok(tokio::spawn(self.clone().read_loop(reader, write_task)))
    }

    async fn read_loop(self, mut reader: ReadHalf<BoxedStream>, writer: JoinHandle<()>) -> BotResult<()> {
        let result = self.read_lines(&mut reader).await;

        self.inner.cancel.cancel();
        if let Err(e) = writer.await {
            warn!(bot_id = self.id(), error = %e, "Write loop panicked");
        }
        *self.inner.state.lock() = BotState::Disconnected;

        match &result {
            Ok(()) => info!(bot_id = self.id(), network = %self.inner.network, "Disconnected"),
            Err(e) => warn!(bot_id = self.id(), network = %self.inner.network, error = %e, "Connection terminated"),
        }

        self.emit(EventKind::Disconnected, EventData::empty()).await;
        result
    }

    async fn read_lines(&self, reader: &mut ReadHalf<BoxedStream>) -> BotResult<()> {
        let limit = self.inner.config.max_buffer;
        let mut buffer: Vec<u8> = Vec::with_capacity(READ_CHUNK_SIZE);
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            let read = tokio::select! {
                _ = self.inner.cancel.cancelled() => return Ok(()),
                read = reader.read(&mut chunk) => read?,
            };
            if read == 0 {
                debug!(bot_id = self.id(), "Remote closed the connection");
                return Ok(());
            }

            // Everything before `scan_from` was already searched for '\n'.
            let scan_from = buffer.len();
            buffer.extend_from_slice(&chunk[..read]);

            let mut consumed = 0;
            for end in scan_from..buffer.len() {
                if buffer[end] == b'\n' {
                    self.dispatch_line(&buffer[consumed..end]).await;
                    consumed = end + 1;
                }
            }
            buffer.drain(..consumed);

            if buffer.len() > limit {
                return Err(BotError::BufferExceeded { limit });
            }
        }
    }

    async fn dispatch_line(&self, raw: &[u8]) {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.is_empty() {
            return;
        }

        let line: Arc<str> = Arc::from(String::from_utf8_lossy(raw).as_ref());
        let message = match Message::parse(&line) {
            Ok(message) => Arc::new(message),
            Err(e) => {
                warn!(bot_id = self.id(), error = %e, "Dropping unparseable line");
                return;
            }
        };

        if message.command == "JOIN"
            && let Some(name) = message.arg(0)
        {
            let proxy = self.inner.channels.lock().get(&channel_key(name)).cloned();
            if let Some(proxy) = proxy {
                proxy.confirm(self.id());
            }
        }

        let command = EventKind::command(&message.command);
        let data = EventData::from_message(message, line);
        self.emit(EventKind::Message, data.clone()).await;
        self.emit(command, data).await;
    }

    async fn write_loop(self, mut writer: WriteHalf<BoxedStream>, mut outbound: mpsc::UnboundedReceiver<String>) {
        loop {
            let line = tokio::select! {
                _ = self.inner.cancel.cancelled() => break,
                next = outbound.recv() => match next {
                    Some(line) => line,
                    None => break,
                },
            };

            let written = tokio::select! {
                _ = self.inner.cancel.cancelled() => break,
                written = self.write_line(&mut writer, line) => written,
            };

            if let Err(e) = written {
                warn!(bot_id = self.id(), error = %e, "Write failed, closing connection");
                self.inner.cancel.cancel();
                break;
            }
        }
        trace!(bot_id = self.id(), "Write loop stopped");
    }

    async fn write_line(&self, writer: &mut WriteHalf<BoxedStream>, line: String) -> std::io::Result<()> {
        let line: Arc<str> = Arc::from(line);
        self.emit(EventKind::BeforeWrite, EventData::from_line(Arc::clone(&line)))
            .await;

        let mut bytes = Vec::with_capacity(line.len() + 2);
        bytes.extend_from_slice(line.as_bytes());
        bytes.extend_from_slice(b"\r\n");
        writer.write_all(&bytes).await?;
        writer.flush().await
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("id", &self.inner.id)
            .field("network", &self.inner.network)
            .field("state", &self.state())
            .finish()
    }
}
