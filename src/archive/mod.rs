//! Object storage for archived webhook payloads and job logs.
//!
//! Objects are addressed by slash-separated keys such as
//! `workflow_job/12345` or `log/12345`. Writing an existing key replaces
//! the object.
//!
//! ## Storage Backends
//!
//! - `FilesystemObjectStore` - Local filesystem storage
//! - `S3ObjectStore` (feature: s3) - Amazon S3
//! - `MockObjectStore` - In-memory, for tests

mod config;
mod filesystem;
mod mock;
#[cfg(feature = "s3")]
mod s3;

#[cfg(feature = "s3")]
pub use config::S3StoreConfig;
pub use config::{FilesystemStoreConfig, ObjectStoreConfig, ObjectStoreType};
pub use filesystem::FilesystemObjectStore;
pub use mock::MockObjectStore;
#[cfg(feature = "s3")]
pub use s3::S3ObjectStore;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

/// Content type for archived JSON payloads.
pub const CONTENT_TYPE_JSON: &str = "application/json";
/// Content type for job logs.
pub const CONTENT_TYPE_TEXT: &str = "text/plain";
/// Content encoding of gzip-compressed bodies.
pub const CONTENT_ENCODING_GZIP: &str = "gzip";

/// Errors that can occur during object store operations.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("Failed to store object {key}: {message}")]
    StoreFailed { key: String, message: String },

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for object store operations.
pub type Result<T> = std::result::Result<T, ObjectStoreError>;

/// An object to archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveObject {
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: String,
    /// Set when `body` is compressed, e.g. `gzip`.
    pub content_encoding: Option<String>,
    /// User metadata stored alongside the object.
    pub metadata: BTreeMap<String, String>,
}

impl ArchiveObject {
    pub fn new(key: impl Into<String>, body: Vec<u8>, content_type: &str) -> Self {
        Self {
            key: key.into(),
            body,
            content_type: content_type.to_string(),
            content_encoding: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn json(key: impl Into<String>, body: Vec<u8>) -> Self {
        Self::new(key, body, CONTENT_TYPE_JSON)
    }

    pub fn text(key: impl Into<String>, body: Vec<u8>) -> Self {
        Self::new(key, body, CONTENT_TYPE_TEXT)
    }

    pub fn with_content_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.content_encoding = Some(encoding.into());
        self
    }

    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }
}

/// Keyed object storage backend.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store an object, replacing any object with the same key.
    ///
    /// Returns the URI of the stored object.
    async fn put(&self, object: ArchiveObject) -> Result<String>;

    /// Read an object's body.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Backend name for logging.
    fn backend(&self) -> &'static str;
}

/// Reject keys that could escape the store root or address nothing.
pub fn validate_key(key: &str) -> Result<()> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.ends_with('/')
        || key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if invalid {
        return Err(ObjectStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

// ============================================================================
// Factory
// ============================================================================

/// Initialize an object store based on configuration.
///
/// # Errors
///
/// Returns error if the configured store type requires an unavailable feature.
pub async fn init_object_store(
    config: &ObjectStoreConfig,
) -> std::result::Result<Arc<dyn ObjectStore>, Box<dyn std::error::Error>> {
    match config.store_type {
        ObjectStoreType::Filesystem => {
            info!(
                path = %config.filesystem.base_path.display(),
                "ObjectStore: filesystem"
            );
            let store = FilesystemObjectStore::new(&config.filesystem.base_path).await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "s3")]
        ObjectStoreType::S3 => {
            info!(
                bucket = %config.s3.bucket,
                prefix = ?config.s3.prefix,
                region = ?config.s3.region,
                endpoint = ?config.s3.endpoint,
                "ObjectStore: s3"
            );
            let store = match &config.s3.endpoint {
                Some(endpoint) => {
                    S3ObjectStore::with_endpoint(
                        &config.s3.bucket,
                        config.s3.prefix.clone(),
                        endpoint,
                        config.s3.region.as_deref(),
                    )
                    .await
                }
                None => S3ObjectStore::new(&config.s3.bucket, config.s3.prefix.clone()).await,
            };
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_key() {
        assert!(validate_key("workflow_job/123").is_ok());
        assert!(validate_key("workflow_run/pytorch/vision/9").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("log/../../secret").is_err());
        assert!(validate_key("log//1").is_err());
        assert!(validate_key("log/").is_err());
    }

    #[test]
    fn test_archive_object_builders() {
        let object = ArchiveObject::text("log/1", b"hello".to_vec()).with_metadata("conclusion", "failure");
        assert_eq!(object.content_type, CONTENT_TYPE_TEXT);
        assert_eq!(object.metadata["conclusion"], "failure");
        assert_eq!(ArchiveObject::json("a/1", vec![]).content_type, CONTENT_TYPE_JSON);
    }

    #[tokio::test]
    async fn test_init_object_store_filesystem() {
        let temp_dir = TempDir::new().unwrap();
        let config = ObjectStoreConfig {
            store_type: ObjectStoreType::Filesystem,
            filesystem: FilesystemStoreConfig {
                base_path: temp_dir.path().to_path_buf(),
            },
            ..Default::default()
        };

        let store = init_object_store(&config).await.unwrap();
        assert_eq!(store.backend(), "filesystem");

        store
            .put(ArchiveObject::json("workflow_job/1", b"{}".to_vec()))
            .await
            .unwrap();
        assert_eq!(store.get("workflow_job/1").await.unwrap(), b"{}");
    }
}
