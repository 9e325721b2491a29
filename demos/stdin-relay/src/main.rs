//! Stdin Relay
//!
//! Reads one queue entry per line from stdin and delivers it through the
//! Courier runtime:
//!
//! ```bash
//! echo '{"type": "message", "channel": {"host": "irc.libera.chat", "channel": "#courier-test"}, "payload": {"msg": "hello"}}' \
//!     | cargo run --package stdin-relay
//! ```
//!
//! When stdin ends, queued messages are delivered and the relay exits. With
//! `--stay` it keeps running until Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use courier::prelude::*;
use courier::runtime::RuntimeBuilder;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (defaults to courier.toml in the current or user
    /// config directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. development or production
    #[arg(short, long)]
    profile: Option<String>,

    /// Keep running after stdin is closed
    #[arg(long)]
    stay: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = RuntimeBuilder::new();
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &args.profile {
        builder = builder.profile(profile);
    }

    let queue = Arc::new(MemoryQueue::new());
    let runtime = builder.build(queue.clone())?;

    let reader = {
        let queue = Arc::clone(&queue);
        let stay = args.stay;
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            let mut pushed = 0usize;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => {
                        if queue.push(line).await.is_err() {
                            break;
                        }
                        pushed += 1;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin");
                        break;
                    }
                }
            }
            info!(entries = pushed, "Stdin closed");
            if !stay {
                queue.close();
            }
        })
    };

    runtime.run().await?;
    reader.abort();

    Ok(())
}
