//! # beacon-server
//!
//! HTTP host for beacon-presence.
//!
//! This binary provides:
//! - REST API for pairing beacons, presence settings and recent events
//! - A background monitor that scans periodically and debounces presence
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package beacon-server
//!
//! # Production
//! BEACON_ENV=production ./beacon-server
//! ```
//!
//! `BEACON_CONFIG` overrides the configuration file location.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use beacon_core::{default_config_path, BeaconConfig, Monitor, Storage};
use beacon_server::state::{default_scanner, AppState};
use beacon_server::{api, logging};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(logging::LogMode::from_env())?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting beacon-server");

    let config_path = match std::env::var_os("BEACON_CONFIG") {
        Some(path) => PathBuf::from(path),
        None => default_config_path()?,
    };
    let config = BeaconConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    info!(path = %config_path.display(), drivers = config.drivers.len(), "Configuration loaded");

    let storage = Storage::new(config.storage.resolve_data_dir()?);
    let addr: SocketAddr = config.server.bind_address.parse()?;
    let interval = config.monitor.scan_interval();
    let scanner = default_scanner(&config).await;

    let state = AppState::new(config, Some(config_path), scanner.clone(), storage)?.shared();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = Monitor::new(scanner);
    let monitor_state = state.clone();
    let monitor_task = tokio::spawn(async move {
        monitor
            .run(
                interval,
                move || {
                    let state = monitor_state.clone();
                    async move { state.read().await.device_list() }
                },
                shutdown_rx,
            )
            .await;
    });

    let listener = TcpListener::bind(addr).await?;

    info!("Listening on {}", addr);

    axum::serve(listener, api::create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    monitor_task.await?;

    info!("beacon-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
