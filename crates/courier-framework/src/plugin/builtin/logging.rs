//! Traffic tracing.
//!
//! Observes every received and sent line without ever delaying either loop.

use tracing::{debug, trace};

use crate::context::HandlerContext;
use crate::error::BoxError;
use crate::plugin::Plugin;
use courier_core::EventKind;

/// Name of the logging plugin.
pub const LOGGING_PLUGIN: &str = "logging";

/// Creates the logging plugin.
pub fn logging_plugin() -> Plugin {
    Plugin::new(LOGGING_PLUGIN)
        .on(EventKind::Message, log_received)
        .on(EventKind::BeforeWrite, log_sent)
}

async fn log_received(ctx: HandlerContext) -> Result<(), BoxError> {
    debug!(
        bot_id = ctx.bot().id(),
        network = %ctx.bot().network(),
        command = ctx.command().unwrap_or_default(),
        line = ctx.line().unwrap_or_default(),
        "<<"
    );
    Ok(())
}

async fn log_sent(ctx: HandlerContext) -> Result<(), BoxError> {
    trace!(
        bot_id = ctx.bot().id(),
        network = %ctx.bot().network(),
        line = ctx.line().unwrap_or_default(),
        ">>"
    );
    Ok(())
}
