//! Offline evaluation of a [`ScoreMapping`] against historical failures.
//!
//! For a sample of failures, the changed files of the failing commit are
//! used to predict a ranking of test files. The report measures how close
//! to the top of that ranking the actually failing test landed.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;

use super::merge_base::{FailedTest, MergeBaseIndex};
use super::score::{ScoreMapping, TestGranularity};

/// Header of the per-file CSV report.
pub const CSV_HEADER: &str =
    "file,average,median,average wrong,median wrong,average right,median right,count";

/// Fraction of candidates under which a prediction counts as "near the top".
pub const TOP_FRACTION: f64 = 0.1;

#[derive(Debug, Clone, Copy)]
pub struct EvaluationOptions {
    /// Evaluate every n-th failure, starting with the first.
    pub sample_stride: usize,
    pub granularity: TestGranularity,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            sample_stride: 10,
            granularity: TestGranularity::default(),
        }
    }
}

/// Normalized ranks observed for one candidate file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileRanks {
    pub file: String,
    /// Rank of this file for every sampled failure.
    pub all: Vec<f64>,
    /// Ranks for failures of some other file.
    pub wrong: Vec<f64>,
    /// Ranks for failures of this file.
    pub right: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationReport {
    /// Normalized rank of the failing test, per sampled failure.
    pub ranks: Vec<f64>,
    pub candidate_count: usize,
    /// One entry per candidate, in candidate order.
    pub per_file: Vec<FileRanks>,
}

impl EvaluationReport {
    pub fn average(&self) -> Option<f64> {
        average(&self.ranks)
    }

    pub fn median(&self) -> Option<f64> {
        median(&self.ranks)
    }

    /// Share of sampled failures ranked within the top tenth.
    pub fn within_top_fraction(&self) -> Option<f64> {
        if self.ranks.is_empty() {
            return None;
        }
        let near_top = self.ranks.iter().filter(|r| **r < TOP_FRACTION).count();
        Some(near_top as f64 / self.ranks.len() as f64)
    }

    /// Write the per-file table.
    pub fn write_csv<W: Write>(&self, mut out: W) -> std::io::Result<()> {
        writeln!(out, "{}", CSV_HEADER)?;
        for file in &self.per_file {
            writeln!(
                out,
                "{},{},{},{},{},{},{},{}",
                csv_field(&file.file),
                format_stat(average(&file.all)),
                format_stat(median(&file.all)),
                format_stat(average(&file.wrong)),
                format_stat(median(&file.wrong)),
                format_stat(average(&file.right)),
                format_stat(median(&file.right)),
                file.right.len()
            )?;
        }
        out.flush()
    }
}

/// Rank every sampled failure against the prediction for its commit.
///
/// A candidate's normalized rank is its 1-based position in the prediction
/// divided by the number of candidates; candidates missing from the
/// prediction rank 1.0. Failures whose commit has no merge-base entry are
/// not sampled.
pub fn evaluate(
    tests: &[FailedTest],
    index: &MergeBaseIndex,
    mapping: &ScoreMapping,
    candidates: &[String],
    options: &EvaluationOptions,
) -> EvaluationReport {
    let mut seen = HashSet::new();
    let candidates: Vec<&String> = candidates.iter().filter(|c| seen.insert(*c)).collect();

    let mut per_file: Vec<FileRanks> = candidates
        .iter()
        .map(|file| FileRanks {
            file: file.to_string(),
            ..FileRanks::default()
        })
        .collect();
    let mut ranks = Vec::new();

    for test in tests.iter().step_by(options.sample_stride.max(1)) {
        let Some(changed_files) = index.changed_files(&test.head_sha) else {
            continue;
        };

        let positions = rank_positions(&predict(mapping, changed_files), candidates.len());
        let failing = options.granularity.test_key(test);
        ranks.push(positions.get(&failing).copied().unwrap_or(1.0));

        for entry in per_file.iter_mut() {
            let rank = positions.get(&entry.file).copied().unwrap_or(1.0);
            entry.all.push(rank);
            if entry.file == failing {
                entry.right.push(rank);
            } else {
                entry.wrong.push(rank);
            }
        }
    }

    EvaluationReport {
        ranks,
        candidate_count: candidates.len(),
        per_file,
    }
}

/// Sum the scores of every test over the changed files.
pub fn predict<'a, I>(mapping: &ScoreMapping, changed_files: I) -> Vec<(String, f64)>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for file in changed_files {
        if let Some(scores) = mapping.get(file) {
            for (test, score) in scores {
                *totals.entry(test.as_str()).or_insert(0.0) += score;
            }
        }
    }

    let mut prediction: Vec<(String, f64)> = totals
        .into_iter()
        .map(|(test, score)| (test.to_string(), score))
        .collect();
    // BTreeMap order already breaks ties by name; the sort is stable.
    prediction.sort_by(|a, b| b.1.total_cmp(&a.1));
    prediction
}

fn rank_positions(prediction: &[(String, f64)], candidate_count: usize) -> BTreeMap<String, f64> {
    if candidate_count == 0 {
        return BTreeMap::new();
    }
    prediction
        .iter()
        .enumerate()
        .map(|(i, (test, _))| (test.clone(), (i + 1) as f64 / candidate_count as f64))
        .collect()
}

pub fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Upper median: the element at `len / 2` of the sorted values.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(sorted[sorted.len() / 2])
}

/// Two decimals, or `N/A` for an empty set.
pub fn format_stat(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => "N/A".to_string(),
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
