//! Server configuration.
//!
//! Loaded from environment variables with development defaults, all
//! overridable via `STRONGBOX_*`.

use std::net::SocketAddr;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Storage backend selection.
    pub storage_backend: StorageBackendType,
    /// Log level filter (e.g. `info`, `debug`).
    pub log_level: String,
}

/// Supported storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackendType {
    /// In-memory — development only, data lost on restart, no
    /// distributed locking.
    Memory,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// - `STRONGBOX_BIND_ADDR` — listen address (default `127.0.0.1:8200`)
    /// - `STRONGBOX_STORAGE` — `memory` (default)
    /// - `STRONGBOX_LOG_LEVEL` — log filter (default `info`)
    #[must_use]
    pub fn from_env() -> Self {
        let bind_addr = std::env::var("STRONGBOX_BIND_ADDR")
            .ok()
            .and_then(|addr| addr.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8200)));

        let storage_backend = match std::env::var("STRONGBOX_STORAGE").as_deref() {
            Ok("memory") | Err(_) => StorageBackendType::Memory,
            Ok(other) => {
                tracing::warn!(backend = other, "unknown storage backend, using memory");
                StorageBackendType::Memory
            }
        };

        let log_level = std::env::var("STRONGBOX_LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());

        Self {
            bind_addr,
            storage_backend,
            log_level,
        }
    }
}
