//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the configured audit store (running migrations)
//! - Build the shared upstream client once
//! - Assemble the HTTP server around both
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners are bound by the caller, after bootstrap succeeds

use std::sync::Arc;

use crate::config::{AppConfig, StorageBackend, StorageConfig};
use crate::forward::ForwardingEngine;
use crate::http::HttpServer;
use crate::store::{AuditStore, MemoryAuditStore, SqliteAuditStore, StoreError};

/// Reasons the service cannot start.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to open audit store: {0}")]
    Store(#[from] StoreError),
    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Open the store selected by `storage.backend`.
pub async fn open_store(storage: &StorageConfig) -> Result<Arc<dyn AuditStore>, StoreError> {
    match storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory audit store; captures are lost on exit");
            Ok(Arc::new(MemoryAuditStore::new()))
        }
        StorageBackend::Sqlite => {
            let store = SqliteAuditStore::connect(&storage.url, storage.max_connections).await?;
            tracing::info!(url = %storage.url, "SQLite audit store ready");
            Ok(Arc::new(store))
        }
    }
}

/// Initialize every subsystem and return a server ready to run.
pub async fn bootstrap(config: AppConfig) -> Result<HttpServer, StartupError> {
    let store = open_store(&config.storage).await?;
    let engine = ForwardingEngine::from_config(&config.upstream)?;
    tracing::info!(upstream = %engine.base_url(), "Forwarding engine ready");

    Ok(HttpServer::new(config, store, engine))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bootstrap_with_memory_store() {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Memory;

        let server = bootstrap(config).await.unwrap();
        assert_eq!(server.config().storage.backend, StorageBackend::Memory);
    }

    #[tokio::test]
    async fn test_open_sqlite_memory() {
        let storage = StorageConfig {
            backend: StorageBackend::Sqlite,
            url: "sqlite::memory:".into(),
            max_connections: 4,
        };
        let store = open_store(&storage).await.unwrap();
        assert_eq!(store.stats().await.unwrap().total_requests, 0);
    }
}
