//! Historical CI data from ClickHouse.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::cache::QueryCache;
use super::merge_base::{FailedTest, MergeBaseIndex, MergeBaseRecord};
use super::ImpactError;
use crate::clickhouse::ClickHouseClient;

const FAILED_TESTS_QUERY: &str = "\
SELECT DISTINCT
    replaceAll(t.invoking_file, '.', '/') AS invoking_file,
    t.name AS name,
    t.classname AS classname,
    t.file AS file,
    j.head_sha AS head_sha
FROM default.failed_test_runs t
JOIN default.workflow_job j FINAL ON t.job_id = j.id
WHERE t.file != ''
    AND j.completed_at > now() - toIntervalDay({days:UInt32})";

const MERGE_BASES_QUERY: &str = "\
SELECT sha, merge_base, changed_files, repo
FROM default.merge_bases
WHERE repo = '' OR repo = {repo:String}";

const INVOKING_FILES_QUERY: &str = "\
SELECT DISTINCT invoking_file
FROM default.test_run_summary";

#[derive(Deserialize, Serialize)]
struct InvokingFileRow {
    invoking_file: String,
}

/// Loads failures, merge bases and candidate test files.
pub struct ImpactSource {
    client: ClickHouseClient,
    cache: Option<QueryCache>,
    repo: String,
    lookback_days: u32,
}

impl ImpactSource {
    pub fn new(
        client: ClickHouseClient,
        cache: Option<QueryCache>,
        repo: impl Into<String>,
        lookback_days: u32,
    ) -> Self {
        Self {
            client,
            cache,
            repo: repo.into(),
            lookback_days,
        }
    }

    /// Failed tests from jobs completed within the lookback window.
    ///
    /// The window is evaluated by the server so the cached result stays
    /// addressable across runs.
    pub async fn failed_tests(&self) -> Result<Vec<FailedTest>, ImpactError> {
        let days = self.lookback_days.to_string();
        let tests: Vec<FailedTest> = self
            .query(FAILED_TESTS_QUERY, &[("days", days.as_str())])
            .await?;
        info!(count = tests.len(), lookback_days = self.lookback_days, "failed_tests_loaded");
        Ok(tests)
    }

    /// Merge bases for the configured repository (and legacy rows without one).
    pub async fn merge_bases(&self) -> Result<MergeBaseIndex, ImpactError> {
        let rows: Vec<MergeBaseRecord> = self
            .query(MERGE_BASES_QUERY, &[("repo", self.repo.as_str())])
            .await?;
        let index: MergeBaseIndex = rows.into_iter().collect();
        info!(count = index.len(), repo = %self.repo, "merge_bases_loaded");
        Ok(index)
    }

    /// Every test module that has ever run, as a path.
    pub async fn invoking_files(&self) -> Result<Vec<String>, ImpactError> {
        let rows: Vec<InvokingFileRow> = self.query(INVOKING_FILES_QUERY, &[]).await?;
        Ok(rows
            .into_iter()
            .map(|row| module_path(&row.invoking_file))
            .collect())
    }

    async fn query<T>(&self, sql: &str, params: &[(&str, &str)]) -> Result<Vec<T>, ImpactError>
    where
        T: DeserializeOwned + Serialize,
    {
        if let Some(cache) = &self.cache {
            if let Some(rows) = cache.get(sql, params).await {
                return Ok(rows);
            }
        }

        let rows: Vec<T> = self.client.query_rows(sql, params).await?;

        if let Some(cache) = &self.cache {
            cache.put(sql, params, &rows).await;
        }
        Ok(rows)
    }
}

/// `test.nn.test_conv` -> `test/nn/test_conv`.
pub fn module_path(invoking_file: &str) -> String {
    invoking_file.replace('.', "/")
}
