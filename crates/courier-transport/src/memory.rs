//! In-process transport.
//!
//! [`MemoryConnector`] hands out one half of a [`tokio::io::duplex`] pipe per
//! connect call and passes the other half, tagged with the requested network,
//! to the paired [`MemoryAcceptor`]. Tests use the acceptor to script an IRC
//! server.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tracing::debug;

use courier_core::{BoxedStream, Connector, Network, TransportError, TransportResult};

const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Creates a connected connector/acceptor pair.
pub fn memory_pair() -> (MemoryConnector, MemoryAcceptor) {
    let (tx, rx) = mpsc::unbounded_channel();
    let connector = MemoryConnector {
        incoming: tx,
        capacity: DEFAULT_PIPE_CAPACITY,
        history: Arc::new(Mutex::new(Vec::new())),
        refuse: Arc::new(Mutex::new(0)),
    };
    (connector, MemoryAcceptor { incoming: rx })
}

/// Client side of an in-process transport.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    incoming: mpsc::UnboundedSender<(Network, DuplexStream)>,
    capacity: usize,
    history: Arc<Mutex<Vec<Network>>>,
    refuse: Arc<Mutex<usize>>,
}

impl MemoryConnector {
    /// Sets the buffer size of each pipe direction.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Makes the next `count` connect calls fail with a refused connection.
    pub fn refuse_next(&self, count: usize) {
        *self.refuse.lock() = count;
    }

    /// Networks passed to [`Connector::connect`], in call order.
    pub fn connections(&self) -> Vec<Network> {
        self.history.lock().clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, network: &Network) -> TransportResult<BoxedStream> {
        self.history.lock().push(network.clone());

        {
            let mut refuse = self.refuse.lock();
            if *refuse > 0 {
                *refuse -= 1;
                return Err(TransportError::ConnectionFailed {
                    address: network.address(),
                    reason: "connection refused".to_string(),
                });
            }
        }

        let (client, server) = tokio::io::duplex(self.capacity);
        self.incoming
            .send((network.clone(), server))
            .map_err(|_| TransportError::Closed)?;

        debug!(network = %network, "Opened in-memory connection");
        Ok(Box::new(client))
    }
}

/// Server side of an in-process transport.
#[derive(Debug)]
pub struct MemoryAcceptor {
    incoming: mpsc::UnboundedReceiver<(Network, DuplexStream)>,
}

impl MemoryAcceptor {
    /// Waits for the next connection.
    ///
    /// Returns `None` once every connector clone has been dropped.
    pub async fn accept(&mut self) -> Option<(Network, DuplexStream)> {
        self.incoming.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_pipe_carries_bytes_both_ways() {
        let (connector, mut acceptor) = memory_pair();
        let network = Network::new("irc.example.org", 6667);

        let mut client = connector.connect(&network).await.unwrap();
        let (seen, server) = acceptor.accept().await.unwrap();
        assert_eq!(seen, network);

        let mut server = BufReader::new(server);
        client.write_all(b"NICK courier\r\n").await.unwrap();

        let mut line = String::new();
        server.read_line(&mut line).await.unwrap();
        assert_eq!(line, "NICK courier\r\n");

        server.get_mut().write_all(b"PING :x\r\n").await.unwrap();
        let mut reader = BufReader::new(client);
        line.clear();
        reader.read_line(&mut line).await.unwrap();
        assert_eq!(line, "PING :x\r\n");
    }

    #[tokio::test]
    async fn test_refused_and_history() {
        let (connector, _acceptor) = memory_pair();
        let network = Network::new("irc.example.org", 6697).with_tls(true);

        connector.refuse_next(1);
        assert!(matches!(
            connector.connect(&network).await,
            Err(TransportError::ConnectionFailed { .. })
        ));
        assert!(connector.connect(&network).await.is_ok());
        assert_eq!(connector.connections(), vec![network.clone(), network]);
    }

    #[tokio::test]
    async fn test_closed_acceptor() {
        let (connector, acceptor) = memory_pair();
        drop(acceptor);

        let result = connector.connect(&Network::new("irc.example.org", 6667)).await;
        assert!(matches!(result, Err(TransportError::Closed)));
    }
}
