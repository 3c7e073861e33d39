//! Drop failures that are not attributable to the commit under test.

use std::collections::{HashMap, HashSet};

use super::merge_base::{FailedTest, MergeBaseIndex};

/// Keep only failures introduced by their commit.
///
/// A failure is dropped when its commit has no merge-base entry, or when
/// the same test also failed on the merge base. Survivors keep input order.
pub fn filter_tests(tests: &[FailedTest], index: &MergeBaseIndex) -> Vec<FailedTest> {
    let mut failures_by_sha: HashMap<&str, HashSet<(&str, &str, &str, &str)>> = HashMap::new();
    for test in tests {
        failures_by_sha
            .entry(test.head_sha.as_str())
            .or_default()
            .insert(test.identity());
    }

    tests
        .iter()
        .filter(|test| match index.merge_base_of(&test.head_sha) {
            None => false,
            Some(base) => !failures_by_sha
                .get(base)
                .is_some_and(|failures| failures.contains(&test.identity())),
        })
        .cloned()
        .collect()
}
