//! Keep-alive replies.

use crate::context::HandlerContext;
use crate::error::BoxError;
use crate::plugin::Plugin;

/// Name of the ping plugin.
pub const PING_PLUGIN: &str = "ping";

/// Creates a plugin answering `PING` with `PONG` and the same arguments.
pub fn ping_plugin() -> Plugin {
    Plugin::new(PING_PLUGIN).on("PING", pong)
}

async fn pong(ctx: HandlerContext) -> Result<(), BoxError> {
    ctx.bot().send("PONG", ctx.args())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::BotConfig;
    use crate::testing::connected_bot;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_pong_echoes_arguments() {
        let (_bot, mut peer, _task) =
            connected_bot(BotConfig::default(), vec![Arc::new(ping_plugin())]).await;

        peer.send("PING :irc.example.org").await;
        assert_eq!(peer.next_line().await.as_deref(), Some("PONG irc.example.org"));

        peer.send("PING :token with spaces").await;
        assert_eq!(peer.next_line().await.as_deref(), Some("PONG :token with spaces"));
    }
}
