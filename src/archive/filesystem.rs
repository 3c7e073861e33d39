//! Filesystem-based object storage.
//!
//! Stores each object at its key below a base directory, with the content
//! type, content encoding and user metadata in a sidecar file:
//! ```text
//! {base_path}/
//!   workflow_job/
//!     12345
//!     12345.meta.json
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use super::{validate_key, ArchiveObject, ObjectStore, ObjectStoreError, Result};

const META_SUFFIX: &str = ".meta.json";

/// Sidecar contents.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ObjectMeta {
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Filesystem-based object store.
pub struct FilesystemObjectStore {
    base_path: PathBuf,
}

impl FilesystemObjectStore {
    /// Create a new filesystem object store.
    ///
    /// Creates the base directory if it doesn't exist.
    pub async fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).await?;
        Ok(Self { base_path })
    }

    fn path_for_key(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }

    fn meta_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(META_SUFFIX);
        PathBuf::from(name)
    }

    /// Content type and user metadata of a stored object.
    pub async fn metadata(&self, key: &str) -> Result<ObjectMeta> {
        let path = self.path_for_key(key)?;
        let bytes = match fs::read(Self::meta_path(&path)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ObjectStoreError::NotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|e| ObjectStoreError::Io(e.into()))
    }

    /// Write through a temp file unique to this writer, then rename.
    ///
    /// Keys are rewritten by concurrent deliveries; the last rename wins.
    async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
        let mut temp = path.as_os_str().to_os_string();
        temp.push(format!(".{}.tmp", Uuid::new_v4()));
        let temp_path = PathBuf::from(temp);
        fs::write(&temp_path, bytes).await?;
        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn put(&self, object: ArchiveObject) -> Result<String> {
        let path = self.path_for_key(&object.key)?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let meta = ObjectMeta {
            content_type: object.content_type,
            content_encoding: object.content_encoding,
            metadata: object.metadata,
        };
        let meta_bytes = serde_json::to_vec(&meta).map_err(|e| ObjectStoreError::StoreFailed {
            key: object.key.clone(),
            message: e.to_string(),
        })?;

        Self::write_atomic(&path, &object.body).await?;
        Self::write_atomic(&Self::meta_path(&path), &meta_bytes).await?;

        debug!(key = %object.key, size = object.body.len(), "Stored object");
        Ok(format!("file://{}", path.display()))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for_key(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn backend(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_temp_store() -> (FilesystemObjectStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemObjectStore::new(temp_dir.path()).await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (store, _temp) = create_temp_store().await;

        let uri = store
            .put(ArchiveObject::json("workflow_job/42", b"{\"id\": 42}".to_vec()))
            .await
            .unwrap();

        assert!(uri.starts_with("file://"));
        assert!(uri.ends_with("workflow_job/42"));
        assert_eq!(store.get("workflow_job/42").await.unwrap(), b"{\"id\": 42}");
    }

    #[tokio::test]
    async fn test_put_replaces_existing_object() {
        let (store, _temp) = create_temp_store().await;

        store
            .put(ArchiveObject::json("workflow_job/1", b"first".to_vec()))
            .await
            .unwrap();
        store
            .put(ArchiveObject::json("workflow_job/1", b"second".to_vec()))
            .await
            .unwrap();

        assert_eq!(store.get("workflow_job/1").await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_metadata_sidecar() {
        let (store, _temp) = create_temp_store().await;

        store
            .put(ArchiveObject::text("log/7", b"line".to_vec()).with_metadata("conclusion", "success"))
            .await
            .unwrap();

        let meta = store.metadata("log/7").await.unwrap();
        assert_eq!(meta.content_type, "text/plain");
        assert_eq!(meta.metadata["conclusion"], "success");
    }

    #[tokio::test]
    async fn test_metadata_sidecar_keeps_content_encoding() {
        let (store, _temp) = create_temp_store().await;

        store
            .put(ArchiveObject::text("log/8", b"\x1f\x8b".to_vec()).with_content_encoding("gzip"))
            .await
            .unwrap();
        store
            .put(ArchiveObject::json("workflow_job/8", b"{}".to_vec()))
            .await
            .unwrap();

        let log = store.metadata("log/8").await.unwrap();
        assert_eq!(log.content_encoding.as_deref(), Some("gzip"));
        let job = store.metadata("workflow_job/8").await.unwrap();
        assert_eq!(job.content_encoding, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_to_same_key() {
        let (store, temp) = create_temp_store().await;
        let store = std::sync::Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let body = format!("{{\"delivery\": {}}}", i).into_bytes();
                store
                    .put(ArchiveObject::json("workflow_job/4242", body))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored = store.get("workflow_job/4242").await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&stored).unwrap();
        assert!(value["delivery"].as_u64().unwrap() < 64);

        let mut leftovers = std::fs::read_dir(temp.path().join("workflow_job"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .filter(|name| name.ends_with(".tmp"))
            .peekable();
        assert!(leftovers.peek().is_none());
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let (store, _temp) = create_temp_store().await;

        let result = store.get("workflow_run/404").await;
        assert!(matches!(result, Err(ObjectStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_invalid_key() {
        let (store, _temp) = create_temp_store().await;

        let result = store
            .put(ArchiveObject::json("../escape", b"{}".to_vec()))
            .await;
        assert!(matches!(result, Err(ObjectStoreError::InvalidKey(_))));
    }
}
