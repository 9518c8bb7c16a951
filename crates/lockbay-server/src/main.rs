//! Lockbay coordination server binary.

use std::net::SocketAddr;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lockbay_server::background;
use lockbay_server::config::ServerConfig;
use lockbay_server::router::build_router;
use lockbay_server::service::queue;
use lockbay_server::state::AppState;
use lockbay_storage::{Database, DatabaseConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lockbay_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env().context("invalid server configuration")?;
    info!(db = %config.database_path, "Starting lockbay server");

    let db = Database::new(DatabaseConfig::new(&config.database_path))
        .await
        .context("database initialization failed")?;

    // Nothing may stay `executing` from a previous process.
    let recovered = queue::boot_recovery(&db)
        .await
        .context("boot recovery failed")?;
    if !recovered.is_empty() {
        info!(recovered = recovered.len(), "Boot recovery failed stale commands");
    }

    let state = AppState::new(db, config.clone());
    let shutdown = CancellationToken::new();
    let sweeps = background::spawn_sweeps(state.clone(), shutdown.clone());

    let app = build_router(state);
    let addr = SocketAddr::new(
        config.host.parse().context("invalid HOST")?,
        config.port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    shutdown.cancel();
    sweeps.await.ok();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Cannot listen for shutdown signal");
    }
}
