//! Full-covariance Gaussian mixture with per-condition mixture weights.
//!
//! All conditions share the K component densities `N(mu_k, Sigma_k)`; each
//! condition `c` has its own weight vector `w_c`. A bout `x` of condition `c`
//! has likelihood `sum_k w_ck N(x | mu_k, Sigma_k)`.

use super::{MixtureEstimator, MixtureModel, Posterior};
use crate::config::EstimatorConfig;
use crate::matrix::{FeatureMatrix, Matrix};
use crate::{Error, Result};
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use rand::seq::index;
use rand::Rng;
use std::collections::HashSet;
use std::f64::consts::PI;
use tracing::debug;

/// Component density with its covariance factorised once.
#[derive(Debug, Clone)]
struct Component {
    mean: DVector<f64>,
    chol: Cholesky<f64, Dyn>,
    log_norm: f64,
}

impl Component {
    fn new(k: usize, mean: &[f64], covariance: &DMatrix<f64>) -> Result<Self> {
        let chol = Cholesky::new(covariance.clone()).ok_or_else(|| {
            Error::ModelFit(format!("covariance of component {k} is not positive definite"))
        })?;
        let log_det = 2.0 * chol.l_dirty().diagonal().iter().map(|v| v.ln()).sum::<f64>();
        #[allow(clippy::cast_precision_loss)]
        let d = mean.len() as f64;
        Ok(Self {
            mean: DVector::from_column_slice(mean),
            chol,
            log_norm: -0.5 * (d * (2.0 * PI).ln() + log_det),
        })
    }

    /// `log N(x | mean, L L^T)`; only the lower triangle of the factor is read.
    fn log_pdf(&self, x: &[f64]) -> f64 {
        let diff = DVector::from_column_slice(x) - &self.mean;
        self.chol
            .l_dirty()
            .solve_lower_triangular(&diff)
            .map_or(f64::NAN, |y| self.log_norm - 0.5 * y.norm_squared())
    }
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Fitted Gaussian mixture.
#[derive(Debug, Clone)]
pub struct GaussianMixture {
    means: Matrix,
    covariances: Vec<DMatrix<f64>>,
    weights: Matrix,
    components: Vec<Component>,
}

impl GaussianMixture {
    /// Assemble a model from its parameters.
    ///
    /// `means` is `clusters x features`, `covariances` holds one
    /// `features x features` matrix per cluster, `weights` is
    /// `conditions x clusters`.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` for empty or inconsistent shapes and
    /// `ModelFit` if a covariance is not positive definite.
    pub fn from_parameters(
        means: Matrix,
        covariances: Vec<DMatrix<f64>>,
        weights: Matrix,
    ) -> Result<Self> {
        let (k, d) = means.shape();
        if k == 0 || d == 0 {
            return Err(Error::DimensionMismatch(format!(
                "means of shape ({k}, {d}); clusters and features must be positive"
            )));
        }
        if covariances.len() != k {
            return Err(Error::DimensionMismatch(format!(
                "{} covariances for {k} clusters",
                covariances.len()
            )));
        }
        if let Some(c) = covariances.iter().find(|c| c.shape() != (d, d)) {
            return Err(Error::DimensionMismatch(format!(
                "covariance of shape {:?}, expected ({d}, {d})",
                c.shape()
            )));
        }
        if weights.n_cols() != k || weights.n_rows() == 0 {
            return Err(Error::DimensionMismatch(format!(
                "weights of shape {:?} for {k} clusters",
                weights.shape()
            )));
        }
        let components = covariances
            .iter()
            .enumerate()
            .map(|(i, cov)| Component::new(i, means.row(i), cov))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            means,
            covariances,
            weights,
            components,
        })
    }

    /// Component means, `clusters x features`.
    #[must_use]
    pub const fn means(&self) -> &Matrix {
        &self.means
    }

    /// Component covariances, one `features x features` matrix per cluster.
    #[must_use]
    pub fn covariances(&self) -> &[DMatrix<f64>] {
        &self.covariances
    }

    /// Number of conditions the weights cover.
    #[must_use]
    pub fn n_conditions(&self) -> usize {
        self.weights.n_rows()
    }

    fn check_width(&self, data: &FeatureMatrix) -> Result<()> {
        if data.n_cols() != self.means.n_cols() {
            return Err(Error::DimensionMismatch(format!(
                "data has {} features, model has {}",
                data.n_cols(),
                self.means.n_cols()
            )));
        }
        Ok(())
    }

    /// Responsibilities (`clusters x rows`) and total log-likelihood of
    /// `data` under condition `condition`.
    fn responsibilities(&self, condition: usize, data: &FeatureMatrix) -> (DMatrix<f64>, f64) {
        let k = self.components.len();
        let log_w: Vec<f64> = self.weights.row(condition).iter().map(|w| w.ln()).collect();
        let mut resp = Vec::with_capacity(k * data.n_rows());
        let mut total = 0.0;
        let mut joint = vec![0.0; k];
        for x in data.rows() {
            for (j, comp) in self.components.iter().enumerate() {
                joint[j] = log_w[j] + comp.log_pdf(x);
            }
            let lse = log_sum_exp(&joint);
            total += lse;
            resp.extend(joint.iter().map(|l| (l - lse).exp()));
        }
        (DMatrix::from_vec(k, data.n_rows(), resp), total)
    }
}

impl MixtureModel for GaussianMixture {
    fn n_clusters(&self) -> usize {
        self.components.len()
    }

    fn n_features(&self) -> usize {
        self.means.n_cols()
    }

    fn weights(&self) -> &Matrix {
        &self.weights
    }

    fn held_out_log_likelihood(&self, held_out: &[FeatureMatrix]) -> Result<f64> {
        if held_out.len() != self.n_conditions() {
            return Err(Error::DimensionMismatch(format!(
                "{} held-out conditions for a model with {} conditions",
                held_out.len(),
                self.n_conditions()
            )));
        }
        let mut total = 0.0;
        for (c, data) in held_out.iter().enumerate() {
            self.check_width(data)?;
            total += self.responsibilities(c, data).1;
        }
        Ok(total)
    }

    fn posterior(&self, condition: usize, data: &FeatureMatrix) -> Result<Posterior> {
        if condition >= self.n_conditions() {
            return Err(Error::InvalidInput(format!(
                "condition {condition} out of range for a model with {} conditions",
                self.n_conditions()
            )));
        }
        self.check_width(data)?;
        let (resp, _) = self.responsibilities(condition, data);
        Ok(Matrix::from_nalgebra(&resp))
    }
}

/// EM estimator for [`GaussianMixture`].
#[derive(Debug, Clone, Default)]
pub struct GaussianMixtureEstimator {
    config: EstimatorConfig,
}

impl GaussianMixtureEstimator {
    /// Estimator with the given EM settings.
    #[must_use]
    pub const fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    /// EM settings.
    #[must_use]
    pub const fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Initial parameters: K distinct training rows as means, the pooled
    /// covariance for every component, uniform weights.
    fn initialise<R: Rng + ?Sized>(
        &self,
        n_clusters: usize,
        training: &[FeatureMatrix],
        rng: &mut R,
    ) -> Result<GaussianMixture> {
        let d = training[0].n_cols();

        let mut seen = HashSet::new();
        let unique: Vec<&[f64]> = training
            .iter()
            .flat_map(Matrix::rows)
            .filter(|row| seen.insert(row.iter().map(|v| v.to_bits()).collect::<Vec<_>>()))
            .collect();
        if unique.len() < n_clusters {
            return Err(Error::ModelFit(format!(
                "{} unique training observations for {n_clusters} clusters",
                unique.len()
            )));
        }

        let picks = index::sample(rng, unique.len(), n_clusters);
        let mean_rows: Vec<&[f64]> = picks.iter().map(|i| unique[i]).collect();
        let means = Matrix::from_rows(&mean_rows)?;

        let n_total: usize = training.iter().map(Matrix::n_rows).sum();
        #[allow(clippy::cast_precision_loss)]
        let n = n_total as f64;
        let centre = training
            .iter()
            .fold(DVector::<f64>::zeros(d), |acc, x| acc + x.observations().column_sum())
            / n;
        let mut pooled = DMatrix::identity(d, d) * self.config.reg_covar;
        for data in training {
            add_scatter(&mut pooled, data.observations(), &centre, |_| 1.0 / n);
        }

        #[allow(clippy::cast_precision_loss)]
        let uniform = 1.0 / n_clusters as f64;
        let weights = Matrix::from_vec(
            training.len(),
            n_clusters,
            vec![uniform; training.len() * n_clusters],
        )?;

        GaussianMixture::from_parameters(means, vec![pooled; n_clusters], weights)
    }

    /// Maximisation step from per-condition responsibilities
    /// (`clusters x rows` each).
    fn m_step(
        &self,
        training: &[FeatureMatrix],
        resp: &[DMatrix<f64>],
        n_clusters: usize,
    ) -> Result<GaussianMixture> {
        let d = training[0].n_cols();

        let mut nk = DVector::<f64>::zeros(n_clusters);
        // features x clusters
        let mut mean_sums = DMatrix::<f64>::zeros(d, n_clusters);
        let mut weights = Vec::with_capacity(training.len() * n_clusters);
        for (data, r) in training.iter().zip(resp) {
            #[allow(clippy::cast_precision_loss)]
            let n_c = data.n_rows() as f64;
            let counts = r.column_sum();
            weights.extend(counts.iter().map(|c| c / n_c));
            nk += &counts;
            mean_sums += data.observations() * r.transpose();
        }

        if let Some((k, _)) = nk.iter().enumerate().find(|&(_, &c)| c < 10.0 * f64::EPSILON) {
            return Err(Error::ModelFit(format!("component {k} collapsed (no responsibility)")));
        }
        for (mut column, &count) in mean_sums.column_iter_mut().zip(nk.iter()) {
            column /= count;
        }

        let covariances = (0..n_clusters)
            .map(|k| {
                let mean = mean_sums.column(k).into_owned();
                let mut cov = DMatrix::identity(d, d) * self.config.reg_covar;
                for (data, r) in training.iter().zip(resp) {
                    add_scatter(&mut cov, data.observations(), &mean, |i| r[(k, i)] / nk[k]);
                }
                cov
            })
            .collect();

        GaussianMixture::from_parameters(
            Matrix::from_observations(mean_sums),
            covariances,
            Matrix::from_vec(training.len(), n_clusters, weights)?,
        )
    }
}

/// `acc += sum_i w(i) (x_i - centre)(x_i - centre)^T` over the columns `x_i`
/// of `observations`.
fn add_scatter<F>(acc: &mut DMatrix<f64>, observations: &DMatrix<f64>, centre: &DVector<f64>, weight: F)
where
    F: Fn(usize) -> f64,
{
    for (i, x) in observations.column_iter().enumerate() {
        let diff = x - centre;
        acc.ger(weight(i), &diff, &diff, 1.0);
    }
}

impl MixtureEstimator for GaussianMixtureEstimator {
    type Model = GaussianMixture;

    fn fit<R: Rng + ?Sized>(
        &self,
        n_clusters: usize,
        training: &[FeatureMatrix],
        rng: &mut R,
    ) -> Result<GaussianMixture> {
        if n_clusters == 0 {
            return Err(Error::ModelFit("cluster count must be positive".to_string()));
        }
        let Some(first) = training.first() else {
            return Err(Error::ModelFit("no training conditions".to_string()));
        };
        for (c, data) in training.iter().enumerate() {
            if data.n_cols() != first.n_cols() {
                return Err(Error::DimensionMismatch(format!(
                    "training condition {c} has {} features, condition 0 has {}",
                    data.n_cols(),
                    first.n_cols()
                )));
            }
            if data.n_rows() == 0 {
                return Err(Error::ModelFit(format!(
                    "training condition {c} has no observations"
                )));
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let n_total = training.iter().map(Matrix::n_rows).sum::<usize>() as f64;

        let mut model = self.initialise(n_clusters, training, rng)?;
        let mut previous: Option<f64> = None;
        for iteration in 0..self.config.max_iter {
            let mut total = 0.0;
            let resp: Vec<DMatrix<f64>> = training
                .iter()
                .enumerate()
                .map(|(c, data)| {
                    let (r, ll) = model.responsibilities(c, data);
                    total += ll;
                    r
                })
                .collect();
            let mean_ll = total / n_total;
            if !mean_ll.is_finite() {
                return Err(Error::ModelFit(format!(
                    "non-finite log-likelihood at iteration {iteration}"
                )));
            }
            if previous.is_some_and(|p| (mean_ll - p).abs() < self.config.tol) {
                debug!(n_clusters, iteration, mean_ll, "EM converged");
                return Ok(model);
            }
            previous = Some(mean_ll);
            model = self.m_step(training, &resp, n_clusters)?;
        }

        Err(Error::ModelFit(format!(
            "EM did not converge within {} iterations ({n_clusters} clusters)",
            self.config.max_iter
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn two_blobs(n: usize, offset: f64) -> FeatureMatrix {
        let mut rng = StdRng::seed_from_u64(11);
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                let centre = if i % 2 == 0 { 0.0 } else { offset };
                vec![
                    centre + rng.gen_range(-0.5..0.5),
                    centre + rng.gen_range(-0.5..0.5),
                ]
            })
            .collect();
        Matrix::from_rows(&rows).unwrap()
    }

    #[test]
    fn test_fit_recovers_separated_means() {
        let data = two_blobs(200, 10.0);
        let mut rng = StdRng::seed_from_u64(5);
        let model = GaussianMixtureEstimator::default()
            .fit(2, &[data], &mut rng)
            .unwrap();
        let mut centres: Vec<f64> = (0..2).map(|k| model.means().get(k, 0)).collect();
        centres.sort_by(f64::total_cmp);
        assert!(centres[0].abs() < 0.5);
        assert!((centres[1] - 10.0).abs() < 0.5);
        let w = model.weights().row(0);
        assert!((w[0] + w[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_posterior_columns_sum_to_one() {
        let data = two_blobs(100, 6.0);
        let mut rng = StdRng::seed_from_u64(1);
        let model = GaussianMixtureEstimator::default()
            .fit(2, &[data.clone()], &mut rng)
            .unwrap();
        let post = model.posterior(0, &data).unwrap();
        assert_eq!(post.shape(), (2, 100));
        for i in 0..100 {
            assert!((post.get(0, i) + post.get(1, i) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_too_few_unique_points() {
        let data = Matrix::from_rows(&[vec![1.0, 1.0], vec![1.0, 1.0], vec![2.0, 2.0]]).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let result = GaussianMixtureEstimator::default().fit(3, &[data], &mut rng);
        assert!(matches!(result, Err(Error::ModelFit(_))));
    }

    #[test]
    fn test_held_out_condition_count_checked() {
        let data = two_blobs(50, 5.0);
        let mut rng = StdRng::seed_from_u64(2);
        let model = GaussianMixtureEstimator::default()
            .fit(2, &[data.clone()], &mut rng)
            .unwrap();
        let result = model.held_out_log_likelihood(&[data.clone(), data]);
        assert!(matches!(result, Err(Error::DimensionMismatch(_))));
    }

    #[test]
    fn test_component_matches_closed_form_density() {
        let cov = DMatrix::from_row_slice(2, 2, &[4.0, 2.0, 2.0, 3.0]);
        let comp = Component::new(0, &[1.0, -1.0], &cov).unwrap();
        // det = 8, x - mean = (1, 1), Sigma^-1 = [[3, -2], [-2, 4]] / 8
        let maha = (3.0 - 2.0 - 2.0 + 4.0) / 8.0;
        let expected = -0.5 * (2.0 * (2.0 * PI).ln() + 8.0_f64.ln() + maha);
        assert!((comp.log_pdf(&[2.0, 0.0]) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_indefinite_covariance_is_fit_error() {
        let cov = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert!(matches!(Component::new(0, &[0.0, 0.0], &cov), Err(Error::ModelFit(_))));
    }

    #[test]
    fn test_log_sum_exp() {
        let v = log_sum_exp(&[0.0_f64.ln(), 1.0_f64.ln(), 3.0_f64.ln()]);
        assert!((v - 4.0_f64.ln()).abs() < 1e-12);
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY]), f64::NEG_INFINITY);
    }

    #[test]
    fn test_zero_features_rejected() {
        let means = Matrix::zeros(1, 0);
        let weights = Matrix::from_vec(1, 1, vec![1.0]).unwrap();
        assert!(matches!(
            GaussianMixture::from_parameters(means, vec![DMatrix::zeros(0, 0)], weights),
            Err(Error::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_from_parameters_shape_checks() {
        let means = Matrix::zeros(2, 2);
        let covs = vec![DMatrix::identity(2, 2)];
        let weights = Matrix::from_vec(1, 2, vec![0.5, 0.5]).unwrap();
        assert!(matches!(
            GaussianMixture::from_parameters(means, covs, weights),
            Err(Error::DimensionMismatch(_))
        ));
    }
}
