//! Hard state assignment from posterior probabilities.
//!
//! Each observation gets the cluster with the largest posterior. Clusters are
//! scanned in increasing index order and only a strictly larger value replaces
//! the current best, so exact ties go to the lowest cluster index. NaN entries
//! never win over a number.

use crate::matrix::FeatureMatrix;
use crate::model::{MixtureModel, Posterior};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// One label in `[0, n_clusters)` per observation of a condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateAssignment {
    n_clusters: usize,
    labels: Vec<usize>,
}

impl StateAssignment {
    /// Labels from an argmax over each posterior column.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the posterior has observations but no
    /// clusters to assign them to.
    pub fn from_posterior(posterior: &Posterior) -> Result<Self> {
        let (n_clusters, n_obs) = posterior.shape();
        if n_clusters == 0 && n_obs > 0 {
            return Err(Error::DimensionMismatch(format!(
                "posterior has {n_obs} observations but no clusters"
            )));
        }
        Ok(Self {
            n_clusters,
            labels: argmax_columns(posterior),
        })
    }

    /// Number of clusters labels are drawn from.
    #[must_use]
    pub const fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    /// Label of each observation, in observation order.
    #[must_use]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Number of observations assigned to each cluster.
    ///
    /// Labels outside `[0, n_clusters)` (possible only in a hand-edited
    /// serialized assignment) are not counted.
    #[must_use]
    pub fn occupancy(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_clusters];
        for &label in &self.labels {
            if let Some(count) = counts.get_mut(label) {
                *count += 1;
            }
        }
        counts
    }
}

/// Index of the maximal entry in each column (lowest index on ties).
///
/// A posterior with zero rows yields label 0 for every column;
/// [`StateAssignment::from_posterior`] rejects that shape.
#[must_use]
pub fn argmax_columns(posterior: &Posterior) -> Vec<usize> {
    let (n_clusters, n_obs) = posterior.shape();
    (0..n_obs)
        .map(|i| {
            let mut best = 0;
            let mut best_p = f64::NAN;
            for k in 0..n_clusters {
                let p = posterior.get(k, i);
                if p > best_p || (best_p.is_nan() && !p.is_nan()) {
                    best = k;
                    best_p = p;
                }
            }
            best
        })
        .collect()
}

/// Assign every observation of `data` (a matrix of `condition`) to a state.
///
/// # Errors
///
/// Propagates the model's posterior errors (unknown condition, wrong width).
pub fn assign<M: MixtureModel + ?Sized>(
    model: &M,
    condition: usize,
    data: &FeatureMatrix,
) -> Result<StateAssignment> {
    let posterior = model.posterior(condition, data)?;
    StateAssignment::from_posterior(&posterior)
}
