//! A scripted IRC server for bridge and runtime tests.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;

use courier_core::{Message, Network};
use courier_transport::MemoryAcceptor;

const LINE_TIMEOUT: Duration = Duration::from_secs(10);

/// How the scripted server answers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Script {
    /// Send the end of MOTD after `USER`.
    pub welcome: bool,
    /// Echo `JOIN` back as a confirmation.
    pub confirm_joins: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            welcome: true,
            confirm_joins: true,
        }
    }
}

/// Lines received by the server, tagged with the network the client asked
/// for.
pub(crate) struct ServerLog {
    rx: mpsc::UnboundedReceiver<(Network, String)>,
}

impl ServerLog {
    /// Waits for the next received line starting with `prefix`, skipping
    /// everything else.
    pub async fn expect(&mut self, prefix: &str) -> (Network, String) {
        loop {
            let next = tokio::time::timeout(LINE_TIMEOUT, self.rx.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {prefix:?}"));
            match next {
                Some((network, line)) if line.starts_with(prefix) => return (network, line),
                Some(_) => continue,
                None => panic!("server stopped before {prefix:?}"),
            }
        }
    }

    /// Every line received so far that starts with `prefix`.
    pub fn drain_matching(&mut self, prefix: &str) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok((_, line)) = self.rx.try_recv() {
            if line.starts_with(prefix) {
                lines.push(line);
            }
        }
        lines
    }
}

/// Serves every connection accepted on `acceptor` with `script`.
pub(crate) fn scripted_server(mut acceptor: MemoryAcceptor, script: Script) -> ServerLog {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some((network, stream)) = acceptor.accept().await {
            tokio::spawn(serve(network, stream, script, tx.clone()));
        }
    });
    ServerLog { rx }
}

async fn serve(
    network: Network,
    stream: DuplexStream,
    script: Script,
    log: mpsc::UnboundedSender<(Network, String)>,
) {
    let (read, mut write) = tokio::io::split(stream);
    let mut lines = BufReader::new(read).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let _ = log.send((network.clone(), line.clone()));
        let Ok(msg) = Message::parse(&line) else {
            continue;
        };

        let reply = match msg.command.as_str() {
            "USER" if script.welcome => Some(
                ":irc.test 001 courier :Welcome\r\n:irc.test 376 courier :End of /MOTD command.\r\n"
                    .to_string(),
            ),
            "JOIN" if script.confirm_joins => msg
                .arg(0)
                .map(|channel| format!(":courier!courier@test JOIN {channel}\r\n")),
            "QUIT" => break,
            _ => None,
        };

        if let Some(reply) = reply
            && write.write_all(reply.as_bytes()).await.is_err()
        {
            break;
        }
    }
}
