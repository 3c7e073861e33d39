//! Mock object store for testing.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ArchiveObject, ObjectStore, ObjectStoreError, Result};

/// In-memory object store recording every put in order.
#[derive(Default)]
pub struct MockObjectStore {
    puts: RwLock<Vec<ArchiveObject>>,
    fail_prefixes: RwLock<HashSet<String>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject puts whose key starts with `prefix`.
    pub async fn fail_on_prefix(&self, prefix: impl Into<String>) {
        self.fail_prefixes.write().await.insert(prefix.into());
    }

    /// Every successful put, oldest first.
    pub async fn puts(&self) -> Vec<ArchiveObject> {
        self.puts.read().await.clone()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.puts.read().await.iter().map(|o| o.key.clone()).collect()
    }

    /// Latest object stored under `key`.
    pub async fn object(&self, key: &str) -> Option<ArchiveObject> {
        self.puts
            .read()
            .await
            .iter()
            .rev()
            .find(|o| o.key == key)
            .cloned()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn put(&self, object: ArchiveObject) -> Result<String> {
        let rejected = self
            .fail_prefixes
            .read()
            .await
            .iter()
            .any(|prefix| object.key.starts_with(prefix.as_str()));
        if rejected {
            return Err(ObjectStoreError::StoreFailed {
                key: object.key,
                message: "rejected by mock".to_string(),
            });
        }

        let uri = format!("mock://{}", object.key);
        self.puts.write().await.push(object);
        Ok(uri)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.object(key)
            .await
            .map(|o| o.body)
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }

    fn backend(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_latest_put_wins() {
        let store = MockObjectStore::new();
        store.put(ArchiveObject::json("a/1", b"1".to_vec())).await.unwrap();
        store.put(ArchiveObject::json("a/1", b"2".to_vec())).await.unwrap();

        assert_eq!(store.get("a/1").await.unwrap(), b"2");
        assert_eq!(store.keys().await, vec!["a/1", "a/1"]);
    }

    #[tokio::test]
    async fn test_mock_fail_on_prefix() {
        let store = MockObjectStore::new();
        store.fail_on_prefix("log/").await;

        assert!(store.put(ArchiveObject::text("log/1", vec![])).await.is_err());
        assert!(store.put(ArchiveObject::json("workflow_job/1", vec![])).await.is_ok());
        assert!(matches!(
            store.get("log/1").await,
            Err(ObjectStoreError::NotFound(_))
        ));
    }
}
