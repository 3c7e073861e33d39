//! Object store configuration.

use std::path::PathBuf;

use serde::Deserialize;

/// Object store type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStoreType {
    /// Filesystem-based storage (local or mounted).
    #[default]
    Filesystem,
    /// Amazon S3 (requires `s3` feature).
    #[cfg(feature = "s3")]
    S3,
}

/// Object store configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ObjectStoreConfig {
    #[serde(rename = "type")]
    pub store_type: ObjectStoreType,

    pub filesystem: FilesystemStoreConfig,

    /// S3 store configuration (requires `s3` feature).
    #[cfg(feature = "s3")]
    pub s3: S3StoreConfig,
}

/// Filesystem object store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilesystemStoreConfig {
    /// Objects are written to `{base_path}/{key}`.
    pub base_path: PathBuf,
}

impl Default for FilesystemStoreConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("archive"),
        }
    }
}

/// S3 object store configuration.
#[cfg(feature = "s3")]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct S3StoreConfig {
    pub bucket: String,
    /// Optional key prefix within the bucket.
    pub prefix: Option<String>,
    /// AWS region (uses default if not specified).
    pub region: Option<String>,
    /// Custom endpoint URL (for S3-compatible services like MinIO).
    pub endpoint: Option<String>,
}

#[cfg(feature = "s3")]
impl Default for S3StoreConfig {
    fn default() -> Self {
        Self {
            bucket: "ossci-raw-job-status".to_string(),
            prefix: None,
            region: None,
            endpoint: None,
        }
    }
}
