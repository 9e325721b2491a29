//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use courier_framework::BotConfig;
use courier_framework::plugin::builtin::{IdentityConfig, RateLimitConfig};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CourierConfig {
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Registration values used by the identity plugin.
    #[serde(default)]
    pub identity: IdentitySettings,

    /// Outbound write spacing.
    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    /// Per-connection limits.
    #[serde(default)]
    pub bot: BotSettings,

    /// Queue bridge behaviour.
    #[serde(default)]
    pub bridge: BridgeSettings,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the lowercase directive name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to the matching `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line format of log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Newline-delimited JSON. Requires the `json-log` feature.
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log records are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Append to `logging.file_path`.
    File,
}

/// When the log file is rolled over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level, overridden by `RUST_LOG` when set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids in each record.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line in each record.
    #[serde(default)]
    pub file_location: bool,

    /// Log file used when `output` is `file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Rotated files kept on disk; older ones are deleted.
    #[serde(default = "default_max_files")]
    pub max_files: u32,

    /// Per-module levels, e.g. `courier_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            rotation: LogRotation::default(),
            max_files: default_max_files(),
            filters: HashMap::new(),
        }
    }
}

fn default_max_files() -> u32 {
    5
}

// =============================================================================
// Identity
// =============================================================================

/// Registration values sent on every new connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentitySettings {
    #[serde(default = "default_nickname")]
    pub nickname: String,

    /// Tried before a random suffix when `nickname` is taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_nickname: Option<String>,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default = "default_realname")]
    pub realname: String,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            nickname: default_nickname(),
            backup_nickname: None,
            username: default_username(),
            realname: default_realname(),
        }
    }
}

impl IdentitySettings {
    pub fn to_identity_config(&self) -> IdentityConfig {
        IdentityConfig {
            nickname: self.nickname.clone(),
            backup_nickname: self.backup_nickname.clone(),
            username: self.username.clone(),
            realname: self.realname.clone(),
        }
    }
}

fn default_nickname() -> String {
    "courier".to_string()
}

fn default_username() -> String {
    "courier".to_string()
}

fn default_realname() -> String {
    "Courier relay".to_string()
}

// =============================================================================
// Rate limit
// =============================================================================

/// Write spacing, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

impl RateLimitSettings {
    pub fn to_rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            min_interval: Duration::from_millis(self.min_interval_ms),
            max_jitter: Duration::from_millis(self.max_jitter_ms),
        }
    }
}

fn default_min_interval_ms() -> u64 {
    1000
}

fn default_max_jitter_ms() -> u64 {
    250
}

// =============================================================================
// Bot
// =============================================================================

/// Per-connection limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    /// Bytes buffered without a line terminator before the connection is
    /// dropped.
    #[serde(default = "default_max_buffer")]
    pub max_buffer: usize,

    /// TCP connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            max_buffer: default_max_buffer(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl BotSettings {
    pub fn to_bot_config(&self) -> BotConfig {
        BotConfig {
            max_buffer: self.max_buffer,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_max_buffer() -> usize {
    courier_framework::DEFAULT_MAX_BUFFER
}

fn default_connect_timeout_ms() -> u64 {
    30000
}

// =============================================================================
// Bridge
// =============================================================================

/// Queue bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Messages buffered per channel before the drain loop waits.
    #[serde(default = "default_channel_backlog")]
    pub channel_backlog: usize,

    /// How long one delivery attempt may wait for readiness and join
    /// confirmation, in milliseconds.
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,

    /// Time given to bots to send `QUIT` on shutdown, in milliseconds.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// A channel's delivery lane closes after this long without messages, in
    /// milliseconds. The next message for the channel opens a new one.
    #[serde(default = "default_lane_idle_timeout_ms")]
    pub lane_idle_timeout_ms: u64,

    /// Backoff for failed deliveries.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            channel_backlog: default_channel_backlog(),
            join_timeout_ms: default_join_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            lane_idle_timeout_ms: default_lane_idle_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }
}

impl BridgeSettings {
    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn lane_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.lane_idle_timeout_ms)
    }
}

fn default_channel_backlog() -> usize {
    256
}

fn default_join_timeout_ms() -> u64 {
    30000
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

fn default_lane_idle_timeout_ms() -> u64 {
    300_000
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay between retries in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (starting at 1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = delay.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}
