//! ClickHouse destination.
//!
//! ClickHouse does not update rows in place, so an upsert is just another
//! `INSERT`; `ReplacingMergeTree` tables (or `FINAL` reads) pick the latest
//! version per key.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use super::{DestinationStore, Result, KEY_COLUMN};
use crate::clickhouse::{quote_identifier, ClickHouseClient};
use crate::config::ClickHouseConfig;

/// Name of the bound key parameter in [`delete_statement`].
const KEY_PARAM: &str = "id";

/// Row insert for `table`; the row travels as the request body.
pub fn insert_statement(table: &str) -> String {
    format!("INSERT INTO {} FORMAT JSONEachRow", quote_identifier(table))
}

/// Key-scoped delete for `table` with the key bound as `{id:String}`.
pub fn delete_statement(table: &str) -> String {
    format!(
        "DELETE FROM {} WHERE {} = {{{}:String}}",
        quote_identifier(table),
        KEY_COLUMN,
        KEY_PARAM
    )
}

/// ClickHouse implementation of DestinationStore.
pub struct ClickHouseDestination {
    client: ClickHouseClient,
}

impl ClickHouseDestination {
    /// Create the client and verify the server answers.
    pub async fn connect(config: &ClickHouseConfig) -> Result<Self> {
        let client = ClickHouseClient::new(config)?;
        client.ping().await?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DestinationStore for ClickHouseDestination {
    async fn insert_row(&self, table: &str, key: &str, row: &Map<String, Value>) -> Result<()> {
        let body = serde_json::to_string(row)?;
        debug!(table = %table, key = %key, bytes = body.len(), "clickhouse_insert");
        self.client
            .execute(&insert_statement(table), &[], Some(body))
            .await?;
        Ok(())
    }

    async fn delete_by_key(&self, table: &str, key: &str) -> Result<()> {
        debug!(table = %table, key = %key, "clickhouse_delete");
        self.client
            .execute(&delete_statement(table), &[(KEY_PARAM, key)], None)
            .await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "clickhouse"
    }
}
