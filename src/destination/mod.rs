//! Destination stores for replicated CDC rows.
//!
//! Destinations are append-only: an upsert inserts a new row version and
//! never mutates an existing row. Readers resolve the current version by
//! key and highest version marker in their own queries.
//!
//! ## Backends
//!
//! - `ClickHouseDestination` - ClickHouse over HTTP (`JSONEachRow` inserts)
//! - `SqliteDestination` (feature: sqlite) - Local development store
//! - `MockDestinationStore` - In-memory recorder for tests

mod clickhouse;
mod mock;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use clickhouse::{delete_statement, insert_statement, ClickHouseDestination};
pub use mock::{MockDestinationStore, RecordedStatement};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDestination;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

use crate::clickhouse::ClickHouseError;
use crate::config::{ClickHouseConfig, DestinationConfig, DestinationType};

/// Column holding the joined DynamoDB key in every replicated table.
pub const KEY_COLUMN: &str = "dynamoKey";

/// Errors that can occur during destination operations.
#[derive(Debug, thiserror::Error)]
pub enum DestinationError {
    #[error("ClickHouse error: {0}")]
    ClickHouse(#[from] ClickHouseError),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to build statement: {0}")]
    Statement(String),

    #[error("Destination {0} requires the '{0}' feature")]
    NotEnabled(&'static str),

    #[error("Statement rejected: {0}")]
    Rejected(String),
}

/// Result type for destination operations.
pub type Result<T> = std::result::Result<T, DestinationError>;

/// Interface for the replication target.
///
/// Implementations:
/// - `ClickHouseDestination`: ClickHouse HTTP interface
/// - `SqliteDestination`: SQLite (feature `sqlite`)
/// - `MockDestinationStore`: in-memory, for tests
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Insert a row version carrying the whole decoded document.
    ///
    /// `key` is the joined DynamoDB key of the record; backends that keep a
    /// separate key column store it there.
    async fn insert_row(&self, table: &str, key: &str, row: &Map<String, Value>) -> Result<()>;

    /// Delete every row version whose key column equals `key`.
    async fn delete_by_key(&self, table: &str, key: &str) -> Result<()>;

    /// Backend name for logging.
    fn backend(&self) -> &'static str;
}

/// Connect the configured destination.
///
/// Called once per batch. A failure here is fatal for the batch.
pub async fn connect_destination(
    config: &DestinationConfig,
    clickhouse: &ClickHouseConfig,
) -> Result<Arc<dyn DestinationStore>> {
    match config.destination_type {
        DestinationType::Clickhouse => {
            info!(endpoint = %clickhouse.endpoint, "Destination: clickhouse");
            let store = ClickHouseDestination::connect(clickhouse).await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "sqlite")]
        DestinationType::Sqlite => {
            info!(path = %config.sqlite.path.display(), "Destination: sqlite");
            let store = SqliteDestination::connect(&config.sqlite.path).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "sqlite"))]
        DestinationType::Sqlite => Err(DestinationError::NotEnabled("sqlite")),
    }
}
