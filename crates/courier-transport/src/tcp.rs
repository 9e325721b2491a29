//! TCP connector.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, info};

use courier_core::{BoxedStream, Connector, Network, TransportError, TransportResult};

/// Connect timeout used by [`TcpConnector::default`].
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens TCP connections, upgrading to TLS when [`Network::tls`] is set.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Creates a connector with the given connect timeout.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Returns the connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    async fn open_tcp(&self, network: &Network) -> TransportResult<TcpStream> {
        let address = network.address();
        debug!(address = %address, "Opening TCP connection");

        let attempt = TcpStream::connect((network.host.as_str(), network.port));
        let stream = match tokio::time::timeout(self.connect_timeout, attempt).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(TransportError::ConnectionFailed {
                    address,
                    reason: e.to_string(),
                });
            }
            Err(_) => return Err(TransportError::Timeout { address }),
        };

        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, network: &Network) -> TransportResult<BoxedStream> {
        let stream = self.open_tcp(network).await?;

        if !network.tls {
            info!(network = %network, "Connected");
            return Ok(Box::new(stream));
        }

        #[cfg(feature = "tls")]
        {
            let stream = crate::tls::upgrade(stream, network).await?;
            info!(network = %network, "Connected");
            Ok(Box::new(stream))
        }

        #[cfg(not(feature = "tls"))]
        {
            Err(TransportError::Tls {
                address: network.address(),
                reason: "TLS support not enabled (enable the 'tls' feature)".to_string(),
            })
        }
    }
}
