//! TLS upgrade for TCP streams.

use std::sync::{Arc, OnceLock};

use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::{info, warn};

use courier_core::{Network, TransportError, TransportResult};

fn client_config() -> Arc<ClientConfig> {
    static CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();

    CONFIG
        .get_or_init(|| {
            let mut roots = RootCertStore::empty();
            let certs = rustls_native_certs::load_native_certs();
            for cert in certs.certs {
                if let Err(e) = roots.add(cert) {
                    warn!("Failed to add root cert: {}", e);
                }
            }
            for e in &certs.errors {
                warn!("Error loading native certs: {}", e);
            }

            Arc::new(
                ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth(),
            )
        })
        .clone()
}

/// Performs the TLS handshake on an open TCP stream.
pub(crate) async fn upgrade(
    stream: TcpStream,
    network: &Network,
) -> TransportResult<TlsStream<TcpStream>> {
    let server_name = ServerName::try_from(network.host.clone())
        .map_err(|_| TransportError::InvalidServerName(network.host.clone()))?;

    let connector = TlsConnector::from(client_config());
    let stream = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| TransportError::Tls {
            address: network.address(),
            reason: e.to_string(),
        })?;

    info!(host = %network.host, "TLS handshake completed");
    Ok(stream)
}
