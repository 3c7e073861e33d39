//! SQLite destination for local development.
//!
//! Each replicated table is created on first use as an append-only log of
//! row versions:
//!
//! ```text
//! _version INTEGER PRIMARY KEY AUTOINCREMENT, dynamoKey TEXT, document TEXT
//! ```
//!
//! The latest version of a key is the row with the highest `_version`.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use sea_query::{
    Alias, ColumnDef, Expr, Index, Order, Query, QueryStatementWriter, SchemaStatementBuilder,
    SqliteQueryBuilder, Table,
};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{DestinationError, DestinationStore, Result, KEY_COLUMN};

/// Version marker column.
pub const VERSION_COLUMN: &str = "_version";
/// Document column holding the decoded row as JSON text.
pub const DOCUMENT_COLUMN: &str = "document";

/// SQLite implementation of DestinationStore.
pub struct SqliteDestination {
    pool: SqlitePool,
    ensured: Mutex<HashSet<String>>,
}

impl SqliteDestination {
    /// Create a destination on an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            ensured: Mutex::new(HashSet::new()),
        }
    }

    /// Open (or create) a database file.
    pub async fn connect(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        Ok(Self::new(pool))
    }

    /// Private in-memory database (single connection so every statement
    /// sees the same database).
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self::new(pool))
    }

    /// Create the table for `table` if this destination has not seen it yet.
    async fn ensure_table(&self, table: &str) -> Result<()> {
        let mut ensured = self.ensured.lock().await;
        if ensured.contains(table) {
            return Ok(());
        }

        let create_table = Table::create()
            .table(Alias::new(table))
            .if_not_exists()
            .col(
                ColumnDef::new(Alias::new(VERSION_COLUMN))
                    .integer()
                    .not_null()
                    .auto_increment()
                    .primary_key(),
            )
            .col(ColumnDef::new(Alias::new(KEY_COLUMN)).text().not_null())
            .col(ColumnDef::new(Alias::new(DOCUMENT_COLUMN)).text().not_null())
            .to_string(SqliteQueryBuilder);
        sqlx::query(&create_table).execute(&self.pool).await?;

        let idx_key = Index::create()
            .if_not_exists()
            .name(format!("idx_{}_key", table))
            .table(Alias::new(table))
            .col(Alias::new(KEY_COLUMN))
            .to_string(SqliteQueryBuilder);
        sqlx::query(&idx_key).execute(&self.pool).await?;

        info!(table = %table, "sqlite_table_created");
        ensured.insert(table.to_string());
        Ok(())
    }

    /// All stored versions of `key`, oldest first.
    pub async fn versions(&self, table: &str, key: &str) -> Result<Vec<Value>> {
        self.ensure_table(table).await?;

        let query = Query::select()
            .column(Alias::new(DOCUMENT_COLUMN))
            .from(Alias::new(table))
            .and_where(Expr::col(Alias::new(KEY_COLUMN)).eq(key))
            .order_by(Alias::new(VERSION_COLUMN), Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<Value> {
                let document: String = row.try_get(DOCUMENT_COLUMN)?;
                Ok(serde_json::from_str(&document)?)
            })
            .collect()
    }

    /// Current version of `key` (highest version marker), if any.
    pub async fn latest(&self, table: &str, key: &str) -> Result<Option<Value>> {
        Ok(self.versions(table, key).await?.pop())
    }
}

#[async_trait]
impl DestinationStore for SqliteDestination {
    async fn insert_row(&self, table: &str, key: &str, row: &Map<String, Value>) -> Result<()> {
        self.ensure_table(table).await?;

        let document = serde_json::to_string(row)?;
        let query = Query::insert()
            .into_table(Alias::new(table))
            .columns([Alias::new(KEY_COLUMN), Alias::new(DOCUMENT_COLUMN)])
            .values([key.into(), document.into()])
            .map_err(|e| DestinationError::Statement(e.to_string()))?
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        debug!(table = %table, key = %key, "sqlite_insert");
        Ok(())
    }

    async fn delete_by_key(&self, table: &str, key: &str) -> Result<()> {
        self.ensure_table(table).await?;

        let query = Query::delete()
            .from_table(Alias::new(table))
            .and_where(Expr::col(Alias::new(KEY_COLUMN)).eq(key))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        debug!(
            table = %table,
            key = %key,
            rows = result.rows_affected(),
            "sqlite_delete"
        );
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
