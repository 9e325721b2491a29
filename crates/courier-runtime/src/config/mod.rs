//! Configuration for the Courier runtime.
//!
//! Settings are layered with figment (defaults, files, `COURIER_*` environment
//! variables) and checked by [`validate_config`] before the runtime starts.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BotSettings, BridgeSettings, CourierConfig, IdentitySettings, LogFormat, LogLevel, LogOutput,
    LogRotation, LoggingConfig, RateLimitSettings, RetryConfig, SpanEventConfig,
};
pub use validation::validate_config;
