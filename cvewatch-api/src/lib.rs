// ---------------------------------------------------------------------------
// REST API server
// ---------------------------------------------------------------------------
//
// Exposes the equipment inventory, per-CPE CVE lookups, the dashboard
// aggregate, and the on-demand sync trigger over HTTP.

pub mod error;
mod routes;
pub mod state;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cvewatch_db::InventoryStore;
use cvewatch_feed::{NvdClient, VulnFeed};

use state::AppState;

/// Configuration for the API server.
pub struct ApiConfig {
    pub listen_addr: SocketAddr,
    /// Database file; `None` opens the per-user default location.
    pub db_path: Option<PathBuf>,
    /// NVD API key. Without one the feed client pauses before each request.
    pub nvd_api_key: Option<String>,
    /// Optional directory of static dashboard assets served at `/`.
    pub static_dir: Option<PathBuf>,
    /// Interval between automatic inventory syncs.
    pub sync_interval: Duration,
}

/// Build the axum Router (useful for testing).
pub fn build_router(state: Arc<AppState>, static_dir: Option<&Path>) -> axum::Router {
    routes::build_router(state, static_dir)
}

/// Start the API server and block until shutdown (Ctrl+C).
pub async fn start_server(config: ApiConfig) -> anyhow::Result<()> {
    let store = match &config.db_path {
        Some(path) => InventoryStore::open(path)?,
        None => InventoryStore::open_default()?,
    };
    let feed: Arc<dyn VulnFeed> = Arc::new(NvdClient::new(config.nvd_api_key.clone())?);
    let state = Arc::new(AppState::new(store, feed, config.sync_interval));

    let app = build_router(state, config.static_dir.as_deref());
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("API server shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    tracing::info!("shutdown signal received");
}
