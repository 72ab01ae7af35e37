//! Cluster-count selection by cross-validated held-out likelihood
//!
//! For every candidate cluster count `k` and repetition `r`, one trial:
//!
//! ```text
//! seed(run_seed, k, r) ──> split every condition ──> fit k clusters on the
//! training rows ──> total log-likelihood of the held-out rows
//! ```
//!
//! Trials share nothing but read-only data, so they run on a rayon pool when
//! the `rayon` feature is enabled and the config allows it. Each trial owns its
//! random source, so a trial's score does not depend on scheduling or on how
//! many repetitions were requested.
//!
//! A failed fit is recorded on its trial and the sweep continues. Size and
//! dimension problems are checked before any trial runs and abort the sweep.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use boutmix::config::RunConfig;
//! use boutmix::model::GaussianMixtureEstimator;
//! use boutmix::selection::ModelSelector;
//! # use boutmix::matrix::Matrix;
//!
//! # fn main() -> boutmix::Result<()> {
//! # let datasets: Vec<Matrix> = vec![];
//! let config = RunConfig::builder()
//!     .cluster_counts([3, 4, 5])
//!     .repetitions(2)
//!     .train_size(1000)
//!     .build()?;
//! let estimator = GaussianMixtureEstimator::new(config.estimator().clone());
//!
//! let report = ModelSelector::new(&estimator, &config).select(&datasets)?;
//! for summary in report.summaries() {
//!     println!("k={} mean LL={:.1}", summary.cluster_count, summary.mean);
//! }
//! # Ok(())
//! # }
//! ```

mod report;
mod trial;

pub use report::{ScoreSummary, SelectionReport};
pub use trial::{TrialId, TrialRecord, TrialStatus};

use crate::config::RunConfig;
use crate::matrix::FeatureMatrix;
use crate::model::{MixtureEstimator, MixtureModel};
use crate::split::split_conditions;
use crate::{Error, Result};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

/// Scores candidate cluster counts with repeated held-out trials.
#[derive(Debug)]
pub struct ModelSelector<'a, E> {
    estimator: &'a E,
    config: &'a RunConfig,
}

impl<'a, E: MixtureEstimator> ModelSelector<'a, E> {
    /// Create a selector over an estimator and a run configuration.
    #[must_use]
    pub const fn new(estimator: &'a E, config: &'a RunConfig) -> Self {
        Self { estimator, config }
    }

    /// Run every `(cluster count, repetition)` trial on `datasets`
    /// (one feature matrix per condition).
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the run configuration fails validation
    /// (e.g. a repeated cluster count), `InvalidInput` for an empty dataset list, `DimensionMismatch`
    /// for inconsistent feature widths and `InvalidSize` if a condition has
    /// fewer observations than `train_size`. Fit failures do not error; they
    /// are recorded in the report.
    pub fn select(&self, datasets: &[FeatureMatrix]) -> Result<SelectionReport> {
        self.config.validate()?;
        self.check_datasets(datasets)?;

        let ids: Vec<TrialId> = self
            .config
            .cluster_counts()
            .iter()
            .flat_map(|&k| (0..self.config.repetitions()).map(move |r| TrialId::new(k, r)))
            .collect();
        info!(
            trials = ids.len(),
            conditions = datasets.len(),
            train_size = self.config.train_size(),
            "starting cluster-count selection"
        );

        let records = self.run_trials(datasets, &ids);

        let mut report = SelectionReport::new().with_config(serde_json::to_value(self.config)?);
        for &k in self.config.cluster_counts() {
            report.register_cluster_count(k);
        }
        for record in records {
            report.add_trial(record);
        }

        for summary in report.summaries() {
            info!(
                cluster_count = summary.cluster_count,
                mean = summary.mean,
                std = summary.std,
                failures = summary.failures,
                "held-out log-likelihood"
            );
        }
        Ok(report)
    }

    #[cfg(feature = "rayon")]
    fn run_trials(&self, datasets: &[FeatureMatrix], ids: &[TrialId]) -> Vec<TrialRecord> {
        use rayon::prelude::*;

        if self.config.parallel() {
            ids.par_iter().map(|&id| self.run_trial(datasets, id)).collect()
        } else {
            ids.iter().map(|&id| self.run_trial(datasets, id)).collect()
        }
    }

    #[cfg(not(feature = "rayon"))]
    fn run_trials(&self, datasets: &[FeatureMatrix], ids: &[TrialId]) -> Vec<TrialRecord> {
        ids.iter().map(|&id| self.run_trial(datasets, id)).collect()
    }

    /// Run one trial and record its outcome.
    pub fn run_trial(&self, datasets: &[FeatureMatrix], id: TrialId) -> TrialRecord {
        let started_at = Utc::now();
        match self.score_trial(datasets, id) {
            Ok(ll) => {
                debug!(
                    cluster_count = id.cluster_count,
                    repetition = id.repetition,
                    held_out_log_likelihood = ll,
                    "trial finished"
                );
                TrialRecord::success(id, ll, started_at, Utc::now())
            }
            Err(e) => {
                warn!(
                    cluster_count = id.cluster_count,
                    repetition = id.repetition,
                    error = %e,
                    "trial failed"
                );
                TrialRecord::failure(id, e.to_string(), started_at, Utc::now())
            }
        }
    }

    fn score_trial(&self, datasets: &[FeatureMatrix], id: TrialId) -> Result<f64> {
        let mut rng = StdRng::seed_from_u64(id.seed(self.config.seed()));
        let sizes: Vec<usize> = datasets.iter().map(FeatureMatrix::n_rows).collect();
        let splits = split_conditions(
            &sizes,
            self.config.train_size(),
            self.config.sampling(),
            &mut rng,
        )?;

        let mut training = Vec::with_capacity(datasets.len());
        let mut held_out = Vec::with_capacity(datasets.len());
        for (data, split) in datasets.iter().zip(&splits) {
            training.push(data.select_rows(split.train())?);
            held_out.push(data.select_rows(split.held_out())?);
        }

        let model = self.estimator.fit(id.cluster_count, &training, &mut rng)?;
        model.held_out_log_likelihood(&held_out)
    }

    fn check_datasets(&self, datasets: &[FeatureMatrix]) -> Result<()> {
        let Some(first) = datasets.first() else {
            return Err(Error::InvalidInput("no datasets to select on".to_string()));
        };
        for (c, data) in datasets.iter().enumerate() {
            if data.n_cols() != first.n_cols() {
                return Err(Error::DimensionMismatch(format!(
                    "condition {c} has {} features, condition 0 has {}",
                    data.n_cols(),
                    first.n_cols()
                )));
            }
            if data.n_rows() < self.config.train_size() {
                return Err(Error::invalid_size(
                    format!("training split of condition {c}"),
                    self.config.train_size(),
                    data.n_rows(),
                ));
            }
        }
        Ok(())
    }
}

/// Score every candidate cluster count; see [`ModelSelector::select`].
///
/// # Errors
///
/// Same as [`ModelSelector::select`].
pub fn select<E: MixtureEstimator>(
    estimator: &E,
    datasets: &[FeatureMatrix],
    config: &RunConfig,
) -> Result<SelectionReport> {
    ModelSelector::new(estimator, config).select(datasets)
}
