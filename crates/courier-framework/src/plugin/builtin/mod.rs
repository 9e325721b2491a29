//! Built-in policy plugins.
//!
//! | Plugin | Name | Listens to | Purpose |
//! |--------|------|------------|---------|
//! | [`ready_plugin`] | `ready` | `376`, `422` | Flags the end of the handshake so channels may join |
//! | [`identity_plugin`] | `identity` | `connected`, `433`, `disconnected` | Registers `PASS`/`NICK`/`USER`, recovers from nick collisions |
//! | [`rate_limit_plugin`] | `rate_limit` | `before_write` (blocking) | Spaces outbound lines |
//! | [`ping_plugin`] | `ping` | `PING` | Answers keep-alives |
//! | [`logging_plugin`] | `logging` | `message`, `before_write` | Traces traffic |
//!
//! Each configurable plugin takes a process-wide default at construction and
//! reads a per-bot override from its metadata slot when one is set.

pub mod identity;
pub mod logging;
pub mod ping;
pub mod rate_limit;
pub mod ready;

pub use identity::{IDENTITY_PLUGIN, IdentityConfig, NickRegistry, current_nick, identity_plugin};
pub use logging::{LOGGING_PLUGIN, logging_plugin};
pub use ping::{PING_PLUGIN, ping_plugin};
pub use rate_limit::{RATE_LIMIT_PLUGIN, RateLimitConfig, rate_limit_plugin};
pub use ready::{READY_PLUGIN, ReadySignal, is_ready, ready_plugin, ready_signal};
