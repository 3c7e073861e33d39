//! On-disk memoization of query results.
//!
//! Entries are JSON files named by the SHA-256 of the query text and its
//! bound parameters:
//! ```text
//! {dir}/{sha256}.json
//! ```
//!
//! The cache is best-effort. Unreadable or stale entries are misses and
//! write failures are logged.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct QueryCache {
    dir: PathBuf,
    ttl: Option<Duration>,
}

impl QueryCache {
    /// Entries never expire when `ttl` is `None`.
    pub fn new(dir: impl AsRef<Path>, ttl: Option<Duration>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            ttl,
        }
    }

    /// Cache key for a query and its parameters.
    pub fn key(query: &str, params: &[(&str, &str)]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(query.as_bytes());
        for (name, value) in params {
            hasher.update([0u8]);
            hasher.update(name.as_bytes());
            hasher.update([b'=']);
            hasher.update(value.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    pub async fn get<T: DeserializeOwned>(&self, query: &str, params: &[(&str, &str)]) -> Option<T> {
        let key = Self::key(query, params);
        let path = self.path_for(&key);

        if let Some(ttl) = self.ttl {
            let modified = fs::metadata(&path).await.and_then(|m| m.modified()).ok()?;
            let age = SystemTime::now()
                .duration_since(modified)
                .unwrap_or_default();
            if age > ttl {
                debug!(key = %key, age_secs = age.as_secs(), "query_cache_stale");
                return None;
            }
        }

        let bytes = fs::read(&path).await.ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                debug!(key = %key, "query_cache_hit");
                Some(value)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable cache entry");
                None
            }
        }
    }

    pub async fn put<T: Serialize>(&self, query: &str, params: &[(&str, &str)], value: &T) {
        let key = Self::key(query, params);
        if let Err(e) = self.write(&key, value).await {
            warn!(key = %key, error = %e, "Failed to write query cache entry");
        }
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T) -> std::io::Result<()> {
        let bytes = serde_json::to_vec(value)?;
        fs::create_dir_all(&self.dir).await?;

        // Write atomically using a per-writer temp file + rename
        let path = self.path_for(key);
        let temp_path = self.dir.join(format!("{}.{}.tmp", key, Uuid::new_v4()));
        fs::write(&temp_path, bytes).await?;
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }
        Ok(())
    }
}
