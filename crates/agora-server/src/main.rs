//! # agora-server
//!
//! A federated social network node.
//!
//! This binary provides:
//! - **Local accounts and posts** stored in SQLite
//! - **Federated feeds** that merge local posts with posts fetched
//!   concurrently from every reachable peer
//! - **Federation endpoints** peers call to read our posts and to like or
//!   comment on them
//! - **Per-user blocklists** and an admin-managed global server block
//! - **Per-IP rate limiting** with separate budgets for peers and local users

mod actions;
mod api;
mod config;
mod error;
mod feed;
mod federation;
mod fetcher;
mod rate_limit;
mod registry;
#[cfg(test)]
mod testutil;
mod viewer;

use std::time::Duration;

use agora_store::Database;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,agora_server=debug")),
        )
        .init();

    info!("Starting Agora node v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        http_addr = %config.http_addr,
        instance = %config.instance_name,
        public_port = config.public_port,
        auto_register = config.federation_auto_register,
        admin_enabled = config.admin_token.is_some(),
        "Instance settings"
    );

    // -----------------------------------------------------------------------
    // 3. Open the store and make sure the local registry row exists
    // -----------------------------------------------------------------------
    let db = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    let local = db.ensure_local_server(config.public_port)?;
    info!(id = %local.id, port = local.port, "Local server entry ready");

    let http_addr = config.http_addr;
    let app_state = AppState::new(db, config)?;

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Every 5 minutes, evict buckets idle for more than 10
    let rl = app_state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            rl.evict_idle(Duration::from_secs(600)).await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
