//! Commit metadata used to attribute test failures to changed files.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// A test failure observed on a commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct FailedTest {
    /// Test module path, with `.` already replaced by `/`.
    pub invoking_file: String,
    pub name: String,
    pub classname: String,
    pub file: String,
    pub head_sha: String,
}

impl FailedTest {
    /// Identity used to match the same failure across commits.
    pub fn identity(&self) -> (&str, &str, &str, &str) {
        (&self.invoking_file, &self.name, &self.classname, &self.file)
    }

    /// Whether `other` is the same failing test, regardless of commit.
    pub fn same_failure(&self, other: &FailedTest) -> bool {
        self.identity() == other.identity()
    }
}

/// A commit, its merge base, and the files it changed relative to it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MergeBaseRecord {
    pub sha: String,
    pub merge_base: String,
    #[serde(default)]
    pub changed_files: BTreeSet<String>,
    /// Empty for rows written before the column existed.
    #[serde(default)]
    pub repo: String,
}

/// Merge-base records keyed by commit sha.
///
/// Built once per run and read-only afterwards. When the source returns
/// more than one row for a sha the last one wins.
#[derive(Debug, Clone, Default)]
pub struct MergeBaseIndex {
    by_sha: HashMap<String, MergeBaseRecord>,
}

impl MergeBaseIndex {
    pub fn get(&self, sha: &str) -> Option<&MergeBaseRecord> {
        self.by_sha.get(sha)
    }

    /// Merge-base sha of `sha`, if known.
    pub fn merge_base_of(&self, sha: &str) -> Option<&str> {
        self.get(sha).map(|r| r.merge_base.as_str())
    }

    /// Files changed by `sha`, if known.
    pub fn changed_files(&self, sha: &str) -> Option<&BTreeSet<String>> {
        self.get(sha).map(|r| &r.changed_files)
    }

    pub fn len(&self) -> usize {
        self.by_sha.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_sha.is_empty()
    }
}

impl FromIterator<MergeBaseRecord> for MergeBaseIndex {
    fn from_iter<I: IntoIterator<Item = MergeBaseRecord>>(iter: I) -> Self {
        Self {
            by_sha: iter.into_iter().map(|r| (r.sha.clone(), r)).collect(),
        }
    }
}
