//! Mock destination for testing.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{DestinationError, DestinationStore, Result};

/// Statement observed by [`MockDestinationStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedStatement {
    Insert {
        table: String,
        key: String,
        row: Map<String, Value>,
    },
    Delete {
        table: String,
        key: String,
    },
}

/// Mock destination that records statements in memory.
///
/// Statements are recorded even when they are rejected, so tests can check
/// that a failing record was still attempted.
#[derive(Default)]
pub struct MockDestinationStore {
    statements: RwLock<Vec<RecordedStatement>>,
    fail_keys: RwLock<HashSet<String>>,
    fail_tables: RwLock<HashSet<String>>,
}

impl MockDestinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every statement for `key`.
    pub async fn fail_on_key(&self, key: impl Into<String>) {
        self.fail_keys.write().await.insert(key.into());
    }

    /// Reject every statement against `table`.
    pub async fn fail_on_table(&self, table: impl Into<String>) {
        self.fail_tables.write().await.insert(table.into());
    }

    pub async fn statements(&self) -> Vec<RecordedStatement> {
        self.statements.read().await.clone()
    }

    pub async fn inserts(&self) -> Vec<(String, String, Map<String, Value>)> {
        self.statements
            .read()
            .await
            .iter()
            .filter_map(|s| match s {
                RecordedStatement::Insert { table, key, row } => {
                    Some((table.clone(), key.clone(), row.clone()))
                }
                RecordedStatement::Delete { .. } => None,
            })
            .collect()
    }

    pub async fn deletes(&self) -> Vec<(String, String)> {
        self.statements
            .read()
            .await
            .iter()
            .filter_map(|s| match s {
                RecordedStatement::Delete { table, key } => Some((table.clone(), key.clone())),
                RecordedStatement::Insert { .. } => None,
            })
            .collect()
    }

    async fn check(&self, table: &str, key: &str) -> Result<()> {
        if self.fail_tables.read().await.contains(table) {
            return Err(DestinationError::Rejected(format!("table {}", table)));
        }
        if self.fail_keys.read().await.contains(key) {
            return Err(DestinationError::Rejected(format!("key {}", key)));
        }
        Ok(())
    }
}

#[async_trait]
impl DestinationStore for MockDestinationStore {
    async fn insert_row(&self, table: &str, key: &str, row: &Map<String, Value>) -> Result<()> {
        self.statements.write().await.push(RecordedStatement::Insert {
            table: table.to_string(),
            key: key.to_string(),
            row: row.clone(),
        });
        self.check(table, key).await
    }

    async fn delete_by_key(&self, table: &str, key: &str) -> Result<()> {
        self.statements.write().await.push(RecordedStatement::Delete {
            table: table.to_string(),
            key: key.to_string(),
        });
        self.check(table, key).await
    }

    fn backend(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_mock_records_statements() {
        let store = MockDestinationStore::new();
        store
            .insert_row("jobs", "a", &row(json!({"n": 1})))
            .await
            .unwrap();
        store.delete_by_key("jobs", "a").await.unwrap();

        assert_eq!(store.inserts().await.len(), 1);
        assert_eq!(store.deletes().await, vec![("jobs".to_string(), "a".to_string())]);
    }

    #[tokio::test]
    async fn test_mock_fail_on_key_still_records() {
        let store = MockDestinationStore::new();
        store.fail_on_key("bad").await;

        assert!(store.delete_by_key("jobs", "bad").await.is_err());
        assert!(store.insert_row("jobs", "bad", &row(json!({}))).await.is_err());
        assert!(store.delete_by_key("jobs", "good").await.is_ok());
        assert_eq!(store.statements().await.len(), 3);
    }

    #[tokio::test]
    async fn test_mock_fail_on_table() {
        let store = MockDestinationStore::new();
        store.fail_on_table("broken").await;

        assert!(matches!(
            store.delete_by_key("broken", "k").await,
            Err(DestinationError::Rejected(_))
        ));
        assert!(store.delete_by_key("fine", "k").await.is_ok());
    }
}
