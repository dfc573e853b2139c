//! Strongbox server entry point.
//!
//! Bootstraps the storage backend, barrier, and gatekeeper, then serves
//! the HTTP surface with graceful shutdown.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use strongbox_core::barrier::Barrier;
use strongbox_core::gatekeeper::Gatekeeper;
use strongbox_storage::{Capabilities, MemoryStorage, Storage};

use strongbox_server::config::{ServerConfig, StorageBackendType};
use strongbox_server::routes;
use strongbox_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(storage = ?config.storage_backend, "strongbox starting");

    let storage: Arc<dyn Storage> = match &config.storage_backend {
        StorageBackendType::Memory => Arc::new(MemoryStorage::new()),
    };

    if !storage
        .capabilities()
        .has(Capabilities::DISTRIBUTED_LOCKING)
    {
        warn!(
            "storage backend has no distributed locking; \
             read-modify-write operations fall back to last-writer-wins"
        );
    }

    let barrier = Arc::new(Barrier::new(Arc::clone(&storage)));
    let gatekeeper = Arc::new(Gatekeeper::new(storage, barrier));
    let state = Arc::new(AppState { gatekeeper });

    let app = routes::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "strongbox listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("strongbox stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received");
}
