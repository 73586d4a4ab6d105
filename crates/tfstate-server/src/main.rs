//! Terraform HTTP state backend backed by HashiCorp Vault.
//!
//! This server:
//! - Accepts Terraform's HTTP backend requests on /state/{name}
//! - Authenticates each tenant against Vault with its basic-auth credential
//! - Keeps one Vault session per tenant credential
//! - Stores state and advisory lock records in a Vault KV v2 mount

use std::sync::Arc;

use clap::Parser;
use tfstate_core::{LockProtocol, MemoryStoreFactory, SessionPool, SharedStorePool};
use tfstate_vault::{VaultConfig, VaultSessionFactory};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod handlers;

use config::{Backend, Config};
use handlers::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize logging
    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Starting tfstate-server v{}", env!("CARGO_PKG_VERSION"));
    info!("  Listen address: {}", config.listen_address);
    info!("  Backend: {}", config.backend.name());

    let pool: SharedStorePool = match config.backend {
        Backend::Vault => {
            info!("  Vault URL: {}", config.vault_url);
            info!("  Vault store: {}", config.vault_store);
            info!("  Secret prefix: {}", config.vault_prefix);

            Arc::new(SessionPool::new(VaultSessionFactory::new(VaultConfig::new(
                config.vault_url.clone(),
                config.vault_prefix.clone(),
                config.vault_store.clone(),
            ))))
        }
        Backend::Memory => {
            warn!("  State is kept in memory and lost on exit");
            Arc::new(SessionPool::new(MemoryStoreFactory::new()))
        }
    };

    if !config.evict_on_unlock {
        info!("  Sessions are kept after unlock");
    }

    let protocol = LockProtocol::new(pool).with_evict_on_unlock(config.evict_on_unlock);

    // Build application state
    let state = AppState {
        protocol: Arc::new(protocol),
        backend: config.backend.name(),
    };

    let app = router(state);

    // Bind and serve
    let listener = TcpListener::bind(&config.listen_address).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Received Ctrl+C, initiating shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
        info!("Received SIGTERM, initiating shutdown");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
