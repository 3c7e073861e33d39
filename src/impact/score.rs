//! Changed-file to failing-test correlation scores.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

use super::merge_base::{FailedTest, MergeBaseIndex};
use super::ImpactError;

/// `changed_file -> test -> score`. Absent pairs score zero.
pub type ScoreMapping = BTreeMap<String, BTreeMap<String, f64>>;

/// How failing tests are named in a [`ScoreMapping`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TestGranularity {
    /// One entry per test module.
    #[default]
    InvokingFile,
    /// One entry per test case: `invoking_file::classname::name`.
    TestCase,
}

impl TestGranularity {
    pub fn test_key(&self, test: &FailedTest) -> String {
        match self {
            Self::InvokingFile => test.invoking_file.clone(),
            Self::TestCase => format!("{}::{}::{}", test.invoking_file, test.classname, test.name),
        }
    }
}

/// Correlate failing tests with the files their commits changed.
///
/// Each distinct commit that broke a test spreads one unit of blame evenly
/// over the files it changed. Commits without a merge-base entry, or with
/// no changed files, contribute nothing.
pub fn build_scores(
    tests: &[FailedTest],
    index: &MergeBaseIndex,
    granularity: TestGranularity,
) -> ScoreMapping {
    let mut shas_by_test: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
    for test in tests {
        shas_by_test
            .entry(granularity.test_key(test))
            .or_default()
            .insert(test.head_sha.as_str());
    }

    let mut mapping = ScoreMapping::new();
    for (test_key, shas) in shas_by_test {
        for sha in shas {
            let Some(changed_files) = index.changed_files(sha) else {
                continue;
            };
            if changed_files.is_empty() {
                continue;
            }

            let share = 1.0 / changed_files.len() as f64;
            for file in changed_files {
                *mapping
                    .entry(file.clone())
                    .or_default()
                    .entry(test_key.clone())
                    .or_insert(0.0) += share;
            }
        }
    }

    mapping
}

/// Read a mapping written by [`save_mapping`].
pub async fn load_mapping(path: &Path) -> Result<ScoreMapping, ImpactError> {
    let text = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&text)?)
}

/// Write a mapping as pretty JSON.
pub async fn save_mapping(path: &Path, mapping: &ScoreMapping) -> Result<(), ImpactError> {
    let text = serde_json::to_string_pretty(mapping)?;
    fs::write(path, text).await?;
    Ok(())
}
