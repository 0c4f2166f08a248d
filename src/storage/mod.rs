pub mod cached;
pub mod memory;
pub mod postgres;
pub mod sql;
pub mod sqlite;
pub mod trait_def;

pub use cached::CachedEventStorage;
pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{EventOrder, EventStorage, HitStorage, StorageError, StorageResult};

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::{DatabaseBackend, DatabaseConfig};

/// Storage handles for the two logs; SQL backends share one pool for both
#[derive(Clone)]
pub struct Backends {
    pub events: Arc<dyn EventStorage>,
    pub hits: Arc<dyn HitStorage>,
}

/// Connect to the configured backend and create its schema
pub async fn connect(config: &DatabaseConfig) -> Result<Backends> {
    match config.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.database_url_for_log());
            let storage = Arc::new(
                SqliteStorage::new(&config.url, config.max_connections)
                    .await
                    .context("Failed to open SQLite database")?,
            );
            storage.init().await.context("Failed to create SQLite schema")?;
            Ok(Backends {
                events: storage.clone(),
                hits: storage,
            })
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage: {}", config.database_url_for_log());
            let storage = Arc::new(
                PostgresStorage::new(&config.url, config.max_connections)
                    .await
                    .context("Failed to connect to PostgreSQL")?,
            );
            storage
                .init()
                .await
                .context("Failed to create PostgreSQL schema")?;
            Ok(Backends {
                events: storage.clone(),
                hits: storage,
            })
        }
        DatabaseBackend::Memory => {
            info!("Using in-memory storage; data is lost on restart");
            let storage = Arc::new(MemoryStorage::new());
            Ok(Backends {
                events: storage.clone(),
                hits: storage,
            })
        }
    }
}
