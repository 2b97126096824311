use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::error::constants::ERR_BIND_FAILED;
use crate::error::{ProtocolError, Result};
use crate::service::RelayService;

const DRAIN_POLL: Duration = Duration::from_millis(100);

/// Bound TCP listener serving one [`RelayService`].
pub struct RelayServer {
    listener: TcpListener,
    service: Arc<RelayService>,
    config: ServerConfig,
}

impl RelayServer {
    /// Bind `config.address`. The bound port is published as `serverPort`.
    #[instrument(skip(config, service), fields(address = %config.address))]
    pub async fn bind(config: ServerConfig, service: Arc<RelayService>) -> Result<Self> {
        let listener = TcpListener::bind(&config.address).await.map_err(|e| {
            ProtocolError::TransportError(format!("{ERR_BIND_FAILED} {}: {e}", config.address))
        })?;
        let local = listener.local_addr()?;
        service.seed_port(local.port());
        info!(address = %local, max_connections = config.max_connections, "Relay listening");

        Ok(Self {
            listener,
            service,
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn service(&self) -> &Arc<RelayService> {
        &self.service
    }

    /// Serve until CTRL+C.
    pub async fn serve(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received CTRL+C signal, shutting down");
                let _ = shutdown_tx.send(()).await;
            }
        });
        self.serve_with_shutdown(shutdown_rx).await
    }

    /// Serve until `shutdown_rx` yields or its sender is dropped, then wait up
    /// to `shutdown_timeout` for in-flight connections.
    pub async fn serve_with_shutdown(self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        let max = self.config.max_connections.max(1);
        let limiter = Arc::new(Semaphore::new(max));

        loop {
            let permit = tokio::select! {
                _ = shutdown_rx.recv() => break,
                permit = Arc::clone(&limiter).acquire_owned() => permit
                    .map_err(|e| ProtocolError::TransportError(e.to_string()))?,
            };

            let (stream, peer) = tokio::select! {
                _ = shutdown_rx.recv() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!(error = %e, "Error accepting connection");
                        continue;
                    }
                },
            };

            let service = Arc::clone(&self.service);
            service.state().metrics.connection_opened();
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = service.serve_stream(stream, peer).await {
                    debug!(peer = %peer, error = %e, "Connection ended without reply");
                }
                service.state().metrics.connection_closed();
            });
        }

        info!("Shutting down relay. Waiting for connections to close...");
        let deadline = tokio::time::sleep(self.config.shutdown_timeout);
        tokio::pin!(deadline);

        loop {
            let active = max - limiter.available_permits();
            if active == 0 {
                info!("All connections closed, shutting down");
                break;
            }
            tokio::select! {
                _ = &mut deadline => {
                    warn!(connections = active, "Shutdown timeout reached, forcing exit");
                    break;
                }
                _ = tokio::time::sleep(DRAIN_POLL) => {
                    debug!(connections = active, "Waiting for connections to close");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::service::RelayClient;

    fn loopback() -> ServerConfig {
        ServerConfig {
            address: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bind_seeds_port() {
        let service = Arc::new(RelayService::default());
        let server = RelayServer::bind(loopback(), Arc::clone(&service))
            .await
            .unwrap();
        let port = server.local_addr().unwrap().port();
        assert_eq!(service.state().config.server_port(), i64::from(port));
    }

    #[tokio::test]
    async fn test_shutdown_stops_accept_loop() {
        let service = Arc::new(RelayService::default());
        let server = RelayServer::bind(loopback(), service).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(server.serve_with_shutdown(rx));

        let client = RelayClient::new(addr.to_string());
        assert!(client.handshake("blake3").await.is_ok());

        tx.send(()).await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_bind_failure_is_transport_error() {
        let bad = ServerConfig {
            address: "127.0.0.1:99999".to_string(),
            ..ServerConfig::default()
        };
        let result = RelayServer::bind(bad, Arc::new(RelayService::default())).await;
        assert!(matches!(result, Err(ProtocolError::TransportError(_))));
    }
}
