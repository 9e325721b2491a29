//! Outbound rate limiting.
//!
//! A blocking `before_write` handler: the write loop cannot put the next line
//! on the wire until this handler returns, so sleeping here spaces writes
//! without any polling.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::trace;

use courier_core::EventKind;

use crate::context::HandlerContext;
use crate::error::BoxError;
use crate::plugin::Plugin;

/// Name of the rate-limit plugin and its metadata namespace.
pub const RATE_LIMIT_PLUGIN: &str = "rate_limit";

/// Spacing between consecutive writes on one bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Minimum time between two writes.
    pub min_interval: Duration,
    /// Upper bound of the random delay added when a write has to wait.
    pub max_jitter: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(1),
            max_jitter: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LastWrite(Instant);

/// Creates the rate-limit plugin. A [`RateLimitConfig`] stored in the plugin's
/// metadata slot on a bot overrides `defaults` for that bot.
pub fn rate_limit_plugin(defaults: RateLimitConfig) -> Plugin {
    Plugin::new(RATE_LIMIT_PLUGIN).on_blocking(EventKind::BeforeWrite, move |ctx| throttle(ctx, defaults))
}

async fn throttle(ctx: HandlerContext, defaults: RateLimitConfig) -> Result<(), BoxError> {
    let config = ctx.plugin().get_or(ctx.bot(), defaults);

    if let Some(LastWrite(last)) = ctx.plugin().get::<LastWrite>(ctx.bot()) {
        let elapsed = last.elapsed();
        if elapsed < config.min_interval {
            let delay = config.min_interval - elapsed + jitter(config.max_jitter);
            trace!(bot_id = ctx.bot().id(), delay_ms = delay.as_millis() as u64, "Throttling write");
            tokio::time::sleep(delay).await;
        }
    }

    ctx.plugin().set(ctx.bot(), LastWrite(Instant::now()));
    Ok(())
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}
