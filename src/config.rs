//! Run configuration
//!
//! A [`RunConfig`] is built once per run and passed by reference into every
//! component. Nothing reads ambient global state.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// How training indices are drawn from a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Sampling {
    /// Distinct indices; held-out set is the exact complement.
    #[default]
    WithoutReplacement,
    /// Independent uniform draws; an observation may appear several times.
    WithReplacement,
}

/// Settings for the Gaussian mixture EM fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// EM iteration cap; exceeding it is a fit failure.
    pub max_iter: usize,
    /// Convergence threshold on the change of mean per-observation log-likelihood.
    pub tol: f64,
    /// Added to covariance diagonals.
    pub reg_covar: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            max_iter: 200,
            tol: 1e-3,
            reg_covar: 1e-6,
        }
    }
}

/// Which feature columns and raw-signal channel describe a bout's kinematics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinematicConfig {
    /// Feature column used as the speed proxy.
    pub speed_column: usize,
    /// Feature column used as the heading-change proxy.
    pub heading_column: usize,
    /// Raw-signal channel averaged per state.
    pub signal_channel: usize,
    /// Histogram bin edges for speed.
    pub speed_bins: Vec<f64>,
    /// Histogram bin edges for heading change.
    pub heading_bins: Vec<f64>,
}

impl Default for KinematicConfig {
    fn default() -> Self {
        Self {
            speed_column: 1,
            heading_column: 0,
            signal_channel: 0,
            speed_bins: linspace(0.0, 35.0, 20),
            heading_bins: linspace(0.0, 150.0, 20),
        }
    }
}

/// `n` evenly spaced values from `start` to `stop` inclusive.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { stop } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// Immutable per-run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    seed: u64,
    n_conditions: usize,
    cluster_counts: Vec<usize>,
    n_clusters: usize,
    train_size: usize,
    repetitions: usize,
    sampling: Sampling,
    parallel: bool,
    condition: usize,
    data_dir: PathBuf,
    out_dir: PathBuf,
    savename: String,
    estimator: EstimatorConfig,
    kinematics: KinematicConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            n_conditions: 2,
            cluster_counts: (3..=10).collect(),
            n_clusters: 7,
            train_size: 40_000,
            repetitions: 5,
            sampling: Sampling::default(),
            parallel: true,
            condition: 0,
            data_dir: PathBuf::from("data"),
            out_dir: PathBuf::from("out"),
            savename: "acid".to_string(),
            estimator: EstimatorConfig::default(),
            kinematics: KinematicConfig::default(),
        }
    }
}

impl RunConfig {
    /// Builder starting from the defaults.
    #[must_use]
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// Load and validate a JSON config file. Missing fields are rejected.
    ///
    /// # Errors
    ///
    /// Returns an IO or JSON error if the file cannot be read or parsed, or
    /// `InvalidConfig` if validation fails.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.n_conditions == 0 {
            return Err(Error::InvalidConfig("n_conditions must be positive".into()));
        }
        if self.cluster_counts.is_empty() {
            return Err(Error::InvalidConfig("cluster_counts must not be empty".into()));
        }
        if self.cluster_counts.contains(&0) || self.n_clusters == 0 {
            return Err(Error::InvalidConfig("cluster counts must be positive".into()));
        }
        let mut seen = HashSet::with_capacity(self.cluster_counts.len());
        if let Some(k) = self.cluster_counts.iter().find(|&&k| !seen.insert(k)) {
            return Err(Error::InvalidConfig(format!("cluster_counts contains {k} more than once")));
        }
        if self.repetitions == 0 {
            return Err(Error::InvalidConfig("repetitions must be positive".into()));
        }
        if self.train_size == 0 {
            return Err(Error::InvalidConfig("train_size must be positive".into()));
        }
        if self.condition >= self.n_conditions {
            return Err(Error::InvalidConfig(format!(
                "condition {} out of range for {} conditions",
                self.condition, self.n_conditions
            )));
        }
        let EstimatorConfig { max_iter, tol, reg_covar } = self.estimator;
        if max_iter == 0 || !(tol > 0.0 && tol.is_finite()) || !(reg_covar >= 0.0 && reg_covar.is_finite()) {
            return Err(Error::InvalidConfig(
                "estimator needs max_iter > 0, tol > 0 and reg_covar >= 0".into(),
            ));
        }
        for (name, edges) in [
            ("speed_bins", &self.kinematics.speed_bins),
            ("heading_bins", &self.kinematics.heading_bins),
        ] {
            if edges.len() < 2 || edges.windows(2).any(|w| w[1] <= w[0]) {
                return Err(Error::InvalidConfig(format!(
                    "{name} needs at least two strictly increasing edges"
                )));
            }
        }
        Ok(())
    }

    /// Base seed of the run.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of conditions to load.
    #[must_use]
    pub const fn n_conditions(&self) -> usize {
        self.n_conditions
    }

    /// Candidate cluster counts for model selection, in sweep order.
    #[must_use]
    pub fn cluster_counts(&self) -> &[usize] {
        &self.cluster_counts
    }

    /// Cluster count used for training and analysis.
    #[must_use]
    pub const fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    /// Training observations drawn per condition.
    #[must_use]
    pub const fn train_size(&self) -> usize {
        self.train_size
    }

    /// Trials per candidate cluster count.
    #[must_use]
    pub const fn repetitions(&self) -> usize {
        self.repetitions
    }

    /// Training index sampling policy.
    #[must_use]
    pub const fn sampling(&self) -> Sampling {
        self.sampling
    }

    /// Whether selection trials may run in parallel.
    #[must_use]
    pub const fn parallel(&self) -> bool {
        self.parallel
    }

    /// Condition analysed after training.
    #[must_use]
    pub const fn condition(&self) -> usize {
        self.condition
    }

    /// Directory holding the per-condition data files.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory for parameters and reports.
    #[must_use]
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Base name of saved model parameters.
    #[must_use]
    pub fn savename(&self) -> &str {
        &self.savename
    }

    /// `out_dir/savename`, the base path of persisted parameters.
    #[must_use]
    pub fn model_base_path(&self) -> PathBuf {
        self.out_dir.join(&self.savename)
    }

    /// EM settings.
    #[must_use]
    pub const fn estimator(&self) -> &EstimatorConfig {
        &self.estimator
    }

    /// Kinematic summary settings.
    #[must_use]
    pub const fn kinematics(&self) -> &KinematicConfig {
        &self.kinematics
    }
}

/// Builder for [`RunConfig`].
#[derive(Debug, Default)]
pub struct RunConfigBuilder {
    config: RunConfig,
}

impl RunConfigBuilder {
    /// Start from an existing configuration (e.g. one loaded from a file).
    #[must_use]
    pub const fn from_config(config: RunConfig) -> Self {
        Self { config }
    }

    /// Set the base seed.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Set the number of conditions.
    #[must_use]
    pub const fn n_conditions(mut self, n: usize) -> Self {
        self.config.n_conditions = n;
        self
    }

    /// Set the candidate cluster counts.
    #[must_use]
    pub fn cluster_counts(mut self, counts: impl IntoIterator<Item = usize>) -> Self {
        self.config.cluster_counts = counts.into_iter().collect();
        self
    }

    /// Set the training cluster count.
    #[must_use]
    pub const fn n_clusters(mut self, n: usize) -> Self {
        self.config.n_clusters = n;
        self
    }

    /// Set the per-condition training size.
    #[must_use]
    pub const fn train_size(mut self, n: usize) -> Self {
        self.config.train_size = n;
        self
    }

    /// Set the number of repetitions per cluster count.
    #[must_use]
    pub const fn repetitions(mut self, n: usize) -> Self {
        self.config.repetitions = n;
        self
    }

    /// Set the sampling policy.
    #[must_use]
    pub const fn sampling(mut self, sampling: Sampling) -> Self {
        self.config.sampling = sampling;
        self
    }

    /// Allow or forbid parallel trials.
    #[must_use]
    pub const fn parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }

    /// Set the analysed condition.
    #[must_use]
    pub const fn condition(mut self, condition: usize) -> Self {
        self.config.condition = condition;
        self
    }

    /// Set the data directory.
    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    /// Set the output directory.
    #[must_use]
    pub fn out_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.out_dir = dir.into();
        self
    }

    /// Set the parameter base name.
    #[must_use]
    pub fn savename(mut self, name: impl Into<String>) -> Self {
        self.config.savename = name.into();
        self
    }

    /// Set the EM settings.
    #[must_use]
    pub fn estimator(mut self, estimator: EstimatorConfig) -> Self {
        self.config.estimator = estimator;
        self
    }

    /// Set the kinematic summary settings.
    #[must_use]
    pub fn kinematics(mut self, kinematics: KinematicConfig) -> Self {
        self.config.kinematics = kinematics;
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if validation fails.
    pub fn build(self) -> Result<RunConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
