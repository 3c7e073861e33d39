//! Amazon S3 object store.
//!
//! Stores objects under their key, optionally below a prefix:
//! ```text
//! s3://{bucket}/{prefix}/{key}
//! ```

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::debug;

use super::{validate_key, ArchiveObject, ObjectStore, ObjectStoreError, Result};

/// S3-based object store.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl S3ObjectStore {
    /// Create a new S3 object store.
    ///
    /// Uses default credentials from the environment (AWS_ACCESS_KEY_ID,
    /// AWS_SECRET_ACCESS_KEY, or IAM role).
    pub async fn new(bucket: impl Into<String>, prefix: Option<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self::with_client(Client::new(&config), bucket, prefix)
    }

    /// Create with custom endpoint (for S3-compatible services like MinIO).
    pub async fn with_endpoint(
        bucket: impl Into<String>,
        prefix: Option<String>,
        endpoint: &str,
        region: Option<&str>,
    ) -> Self {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = region {
            config_loader = config_loader.region(aws_config::Region::new(region.to_string()));
        }

        let config = config_loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .endpoint_url(endpoint)
            .force_path_style(true) // Required for MinIO and most S3-compatible services
            .build();

        Self::with_client(Client::from_conf(s3_config), bucket, prefix)
    }

    /// Create with explicit client (for testing).
    pub fn with_client(client: Client, bucket: impl Into<String>, prefix: Option<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix,
        }
    }
}

/// Full object key for `key` below an optional prefix.
fn object_key(prefix: Option<&str>, key: &str) -> String {
    match prefix.map(|p| p.trim_end_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{}/{}", prefix, key),
        None => key.to_string(),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, object: ArchiveObject) -> Result<String> {
        validate_key(&object.key)?;
        let key = object_key(self.prefix.as_deref(), &object.key);
        let size = object.body.len();

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(object.content_type)
            .set_content_encoding(object.content_encoding)
            .body(ByteStream::from(object.body));
        for (name, value) in object.metadata {
            request = request.metadata(name, value);
        }

        request
            .send()
            .await
            .map_err(|e| ObjectStoreError::StoreFailed {
                key: key.clone(),
                message: format!("S3 upload failed: {}", e),
            })?;

        debug!(key = %key, size, bucket = %self.bucket, "Stored object in S3");
        Ok(format!("s3://{}/{}", self.bucket, key))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        validate_key(key)?;
        let full_key = object_key(self.prefix.as_deref(), key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| {
                let err_str = e.to_string();
                if err_str.contains("NoSuchKey") || err_str.contains("404") {
                    ObjectStoreError::NotFound(key.to_string())
                } else {
                    ObjectStoreError::Io(std::io::Error::other(format!(
                        "S3 download failed: {}",
                        e
                    )))
                }
            })?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| {
                ObjectStoreError::Io(std::io::Error::other(format!("S3 body read failed: {}", e)))
            })?
            .into_bytes()
            .to_vec();

        Ok(body)
    }

    fn backend(&self) -> &'static str {
        "s3"
    }
}
