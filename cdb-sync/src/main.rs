//! cdb-sync - legacy/aggregate bridge service
//!
//! Receives change notifications from the legacy system over HTTP, imports
//! the referenced records into local aggregates and, when enabled, writes
//! local changes back.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cdb_common::config::BridgeConfig;
use cdb_common::events::EventBus;
use clap::Parser;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cdb_sync::legacy::HttpRecordFetcher;
use cdb_sync::sync_back::HttpLegacyClientFactory;
use cdb_sync::Bridge;

/// Command-line arguments for cdb-sync
#[derive(Parser, Debug)]
#[command(name = "cdb-sync")]
#[command(about = "Legacy/aggregate reconciliation and write-back bridge")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "CDB_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured bind address
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = BridgeConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing; RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cdb-sync");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = cdb_sync::db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    let event_bus = EventBus::new(100);

    let fetcher = Arc::new(
        HttpRecordFetcher::new(&config.legacy, config.import.fetch_min_interval_ms)
            .context("Failed to create legacy record fetcher")?,
    );
    let client_factory = Arc::new(
        HttpLegacyClientFactory::new(&config.legacy).context("Failed to create legacy write client")?,
    );

    let bridge = Bridge::assemble(&config, db_pool, fetcher, client_factory, event_bus)
        .context("Failed to wire bridge components")?;

    let app = cdb_sync::build_router(bridge.state).layer(TraceLayer::new_for_http());

    let bind_address = args.bind.unwrap_or_else(|| config.server.bind_address.clone());
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_address))?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
