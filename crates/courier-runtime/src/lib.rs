//! Courier Runtime - configuration, logging and the queue bridge.
//!
//! This crate turns the connection engine in `courier-framework` into a
//! running relay:
//!
//! - [`config`]: layered configuration with figment (`courier.toml`,
//!   `COURIER_*` environment variables)
//! - [`logging`]: `tracing-subscriber` setup driven by that configuration
//! - [`queue`] and [`entry`]: the outbound message queue and its entry format
//! - [`bridge`]: drains the queue into channels through a
//!   [`Manager`](courier_framework::Manager)
//! - [`runtime`]: wires everything together and handles shutdown signals
//!
//! ```ignore
//! use std::sync::Arc;
//! use courier_runtime::{CourierRuntime, MemoryQueue};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let queue = Arc::new(MemoryQueue::new());
//!     let runtime = CourierRuntime::builder().build(queue.clone())?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod entry;
pub mod error;
pub mod logging;
pub mod queue;
pub mod runtime;

#[cfg(test)]
mod testing;

pub use bridge::{BridgeConfig, QueueBridge};
pub use config::{ConfigError, ConfigLoader, ConfigResult, CourierConfig};
pub use entry::{CncEntry, MessageEntry, QueueEntry};
pub use error::{EntryError, QueueError, QueueResult, RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, LoggingError, SpanEvents};
pub use queue::{BoxedQueue, MemoryQueue, Queue};
pub use runtime::{CourierRuntime, RuntimeBuilder};

pub use tracing;
pub use tracing_subscriber;

/// Logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
