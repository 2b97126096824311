//! `lich-relay [PORT] [--config FILE]`
//!
//! Loads configuration (file, then `LICH_RELAY_*` environment overrides,
//! then the port argument), installs logging, and serves until SIGINT or
//! SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};

use lich_relay::config::NetworkConfig;
use lich_relay::error::Result;
use lich_relay::service::RelayService;
use lich_relay::transport::RelayServer;
use lich_relay::utils::logging::init_logging;

#[derive(Debug, Parser)]
#[command(name = "lich-relay", about = "Authenticated multi-protocol relay", version)]
struct Cli {
    /// Port to listen on; overrides the configured address's port.
    port: Option<u16>,

    /// TOML configuration file.
    #[arg(long, short)]
    config: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> Result<NetworkConfig> {
    let mut config = match &cli.config {
        Some(path) => NetworkConfig::from_file(path)?,
        None => NetworkConfig::default(),
    };
    config.apply_env_overrides()?;
    if let Some(port) = cli.port {
        config.server = config.server.with_port(port)?;
    }
    config.validate_strict()?;
    Ok(config)
}

async fn shutdown_signal(tx: mpsc::Sender<()>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down"),
                    _ = term.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                error!(error = %e, "Could not install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                info!("Received SIGINT, shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received CTRL+C, shutting down");
    }
    let _ = tx.send(()).await;
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config.logging)?;

    let service = Arc::new(RelayService::new(config.auth.clone()));
    let server = RelayServer::bind(config.server.clone(), Arc::clone(&service)).await?;

    let (tx, rx) = mpsc::channel::<()>(1);
    tokio::spawn(shutdown_signal(tx));

    server.serve_with_shutdown(rx).await?;
    service.log_metrics();
    info!("Relay stopped");
    Ok(())
}
