//! Mixture-model contract
//!
//! The selection and assignment pipeline only sees these traits:
//!
//! ```text
//! MixtureEstimator::fit ──> MixtureModel ──┬── held_out_log_likelihood
//!                                          ├── posterior
//!                                          └── PersistentModel::save / load
//! ```
//!
//! [`GaussianMixtureEstimator`] is the shipped implementation. Other
//! estimators (different covariance structures, mock models in tests) plug in
//! without touching the selector or the assigner.

mod gaussian;
mod persist;

pub use gaussian::{GaussianMixture, GaussianMixtureEstimator};
pub use persist::{artifact_paths, ArrayFile, PersistentModel};

use crate::matrix::{FeatureMatrix, Matrix};
use crate::Result;
use rand::Rng;

/// Posterior membership probabilities, `clusters x observations`.
///
/// Each column is a probability distribution over clusters.
pub type Posterior = Matrix;

/// A fitted mixture model with shared components and per-condition weights.
pub trait MixtureModel {
    /// Number of mixture components.
    fn n_clusters(&self) -> usize;

    /// Feature-vector length the model was fitted on.
    fn n_features(&self) -> usize;

    /// Mixture weights, `conditions x clusters`.
    fn weights(&self) -> &Matrix;

    /// Total log-likelihood of held-out data; `held_out[c]` is scored with
    /// condition `c`'s weights.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the number of conditions or the feature
    /// width disagrees with the model.
    fn held_out_log_likelihood(&self, held_out: &[FeatureMatrix]) -> Result<f64>;

    /// Posterior over clusters for each row of `data` under `condition`'s
    /// weights.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an unknown condition and
    /// `DimensionMismatch` for a wrong feature width.
    fn posterior(&self, condition: usize, data: &FeatureMatrix) -> Result<Posterior>;
}

/// Fits a [`MixtureModel`] to one training matrix per condition.
pub trait MixtureEstimator: Sync {
    /// Model type produced by [`fit`](Self::fit).
    type Model: MixtureModel + Send;

    /// Fit `n_clusters` components; `training[c]` is condition `c`'s sample.
    ///
    /// # Errors
    ///
    /// Returns `ModelFit` on non-convergence or degenerate input.
    fn fit<R: Rng + ?Sized>(
        &self,
        n_clusters: usize,
        training: &[FeatureMatrix],
        rng: &mut R,
    ) -> Result<Self::Model>;
}
