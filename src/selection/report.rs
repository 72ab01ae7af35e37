//! Selection Report - held-out scores of a cluster-count sweep

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::trial::{TrialRecord, TrialStatus};
use crate::Result;

/// Mean and spread of one cluster count's successful trials.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    /// Cluster count.
    pub cluster_count: usize,
    /// Mean held-out log-likelihood (NaN if every trial failed).
    pub mean: f64,
    /// Population standard deviation (NaN if every trial failed).
    pub std: f64,
    /// Successful trials.
    pub successes: usize,
    /// Failed trials.
    pub failures: usize,
}

/// Trial records of a sweep, grouped by cluster count.
///
/// ## Design
///
/// Records are keyed by cluster count in a `BTreeMap` so iteration follows
/// increasing cluster count; within a key they are ordered by repetition.
/// The run configuration is kept as a JSON snapshot so a saved report
/// describes how it was produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectionReport {
    created_at: DateTime<Utc>,
    config: Option<serde_json::Value>,
    trials: BTreeMap<usize, Vec<TrialRecord>>,
}

impl Default for SelectionReport {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionReport {
    /// Create an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self {
            created_at: Utc::now(),
            config: None,
            trials: BTreeMap::new(),
        }
    }

    /// Attach a configuration snapshot.
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }

    /// When the report was created.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Configuration snapshot, if attached.
    #[must_use]
    pub const fn config(&self) -> Option<&serde_json::Value> {
        self.config.as_ref()
    }

    /// Check if the report holds no trials.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Add a finished trial, keeping repetition order within its cluster count.
    pub fn add_trial(&mut self, record: TrialRecord) {
        let records = self.trials.entry(record.id().cluster_count).or_default();
        let pos = records.partition_point(|r| r.id().repetition < record.id().repetition);
        records.insert(pos, record);
    }

    /// Make sure a cluster count appears in the report even with no trials.
    pub fn register_cluster_count(&mut self, cluster_count: usize) {
        self.trials.entry(cluster_count).or_default();
    }

    /// Cluster counts, ascending.
    #[must_use]
    pub fn cluster_counts(&self) -> Vec<usize> {
        self.trials.keys().copied().collect()
    }

    /// All trials of a cluster count, ordered by repetition.
    #[must_use]
    pub fn trials(&self, cluster_count: usize) -> &[TrialRecord] {
        self.trials
            .get(&cluster_count)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Held-out log-likelihoods of the successful trials of a cluster count,
    /// ordered by repetition.
    #[must_use]
    pub fn scores(&self, cluster_count: usize) -> Vec<f64> {
        self.trials(cluster_count)
            .iter()
            .filter_map(TrialRecord::held_out_log_likelihood)
            .collect()
    }

    /// Number of failed trials of a cluster count.
    #[must_use]
    pub fn failure_count(&self, cluster_count: usize) -> usize {
        self.trials(cluster_count)
            .iter()
            .filter(|r| r.status() == TrialStatus::Failed)
            .count()
    }

    /// Failed trials across all cluster counts.
    #[must_use]
    pub fn failures(&self) -> Vec<&TrialRecord> {
        self.trials
            .values()
            .flatten()
            .filter(|r| r.status() == TrialStatus::Failed)
            .collect()
    }

    /// Mean and population standard deviation per cluster count.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn summaries(&self) -> Vec<ScoreSummary> {
        self.trials
            .keys()
            .map(|&k| {
                let scores = self.scores(k);
                let n = scores.len() as f64;
                let (mean, std) = if scores.is_empty() {
                    (f64::NAN, f64::NAN)
                } else {
                    let mean = scores.iter().sum::<f64>() / n;
                    let var = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
                    (mean, var.sqrt())
                };
                ScoreSummary {
                    cluster_count: k,
                    mean,
                    std,
                    successes: scores.len(),
                    failures: self.failure_count(k),
                }
            })
            .collect()
    }

    /// Write the report as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an IO or JSON error if the file cannot be written.
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path.as_ref(), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::trial::TrialId;

    fn ok(k: usize, rep: usize, ll: f64) -> TrialRecord {
        let now = Utc::now();
        TrialRecord::success(TrialId::new(k, rep), ll, now, now)
    }

    #[test]
    fn test_report_default() {
        let report = SelectionReport::new();
        assert!(report.is_empty());
        assert!(report.scores(3).is_empty());
        assert!(report.config().is_none());
    }

    #[test]
    fn test_trials_ordered_by_repetition() {
        let mut report = SelectionReport::new();
        report.add_trial(ok(3, 2, -2.0));
        report.add_trial(ok(3, 0, -0.0));
        report.add_trial(ok(3, 1, -1.0));

        assert_eq!(report.scores(3), vec![-0.0, -1.0, -2.0]);
    }

    #[test]
    fn test_summary_mean_and_population_std() {
        let mut report = SelectionReport::new();
        report.add_trial(ok(4, 0, -10.0));
        report.add_trial(ok(4, 1, -20.0));
        let now = Utc::now();
        report.add_trial(TrialRecord::failure(TrialId::new(4, 2), "boom", now, now));

        let summary = report.summaries()[0];
        assert_eq!(summary.cluster_count, 4);
        assert!((summary.mean + 15.0).abs() < 1e-12);
        assert!((summary.std - 5.0).abs() < 1e-12);
        assert_eq!(summary.successes, 2);
        assert_eq!(summary.failures, 1);
    }

    #[test]
    fn test_all_failed_summary_is_nan() {
        let mut report = SelectionReport::new();
        let now = Utc::now();
        report.add_trial(TrialRecord::failure(TrialId::new(9, 0), "boom", now, now));
        let summary = report.summaries()[0];
        assert!(summary.mean.is_nan());
        assert_eq!(report.failures().len(), 1);
    }
}
