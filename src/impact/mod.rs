//! Test-impact scoring.
//!
//! Correlates the files a commit changed with the tests that started
//! failing on it, then measures offline how well those correlations would
//! have predicted historical failures.
//!
//! ```text
//! ImpactSource -> MergeBaseIndex -> filter_tests -> build_scores -> evaluate
//! ```

pub mod cache;
pub mod evaluate;
pub mod filter;
pub mod merge_base;
pub mod score;
pub mod source;

pub use cache::QueryCache;
pub use evaluate::{evaluate, EvaluationOptions, EvaluationReport, FileRanks};
pub use filter::filter_tests;
pub use merge_base::{FailedTest, MergeBaseIndex, MergeBaseRecord};
pub use score::{build_scores, load_mapping, save_mapping, ScoreMapping, TestGranularity};
pub use source::ImpactSource;

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::clickhouse::ClickHouseError;

/// Errors from loading history or reading/writing score files.
#[derive(Debug, thiserror::Error)]
pub enum ImpactError {
    #[error("Query failed: {0}")]
    Query(#[from] ClickHouseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Test-impact configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImpactConfig {
    /// Repository whose merge bases are loaded.
    pub repo: String,
    /// Only failures from jobs completed within this many days are used.
    pub lookback_days: u32,
    /// Evaluate every n-th failure.
    pub sample_stride: usize,
    pub granularity: TestGranularity,
    pub cache: CacheConfig,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            repo: "pytorch/pytorch".to_string(),
            lookback_days: 90,
            sample_stride: 10,
            granularity: TestGranularity::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl ImpactConfig {
    pub fn evaluation_options(&self) -> EvaluationOptions {
        EvaluationOptions {
            sample_stride: self.sample_stride,
            granularity: self.granularity,
        }
    }
}

/// Query cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    /// Entry lifetime; entries never expire when unset.
    pub ttl_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(".cache/tributary"),
            ttl_secs: None,
        }
    }
}

impl CacheConfig {
    /// The configured cache, or `None` when disabled.
    pub fn build(&self) -> Option<QueryCache> {
        self.enabled
            .then(|| QueryCache::new(&self.dir, self.ttl_secs.map(Duration::from_secs)))
    }
}

/// Failures attributable to their commit, with the merge bases used to
/// attribute them.
pub struct History {
    pub tests: Vec<FailedTest>,
    pub merge_bases: MergeBaseIndex,
}

impl History {
    pub async fn load(source: &ImpactSource) -> Result<Self, ImpactError> {
        let merge_bases = source.merge_bases().await?;
        let failures = source.failed_tests().await?;
        let tests = filter_tests(&failures, &merge_bases);

        info!(
            loaded = failures.len(),
            kept = tests.len(),
            "failed_tests_filtered"
        );
        Ok(Self { tests, merge_bases })
    }
}
