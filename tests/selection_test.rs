//! Cluster-count selection tests with scripted estimators

use boutmix::config::RunConfig;
use boutmix::matrix::{FeatureMatrix, Matrix};
use boutmix::model::{MixtureEstimator, MixtureModel, Posterior};
use boutmix::selection::{select, ModelSelector, TrialStatus};
use boutmix::{Error, Result};
use rand::Rng;

// =============================================================================
// Scripted models
// =============================================================================

/// Scores held-out data with a value drawn from the trial's random source,
/// so each trial's score identifies the trial's seed.
struct DrawModel {
    n_clusters: usize,
    draw: f64,
    weights: Matrix,
}

impl MixtureModel for DrawModel {
    fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    fn n_features(&self) -> usize {
        1
    }

    fn weights(&self) -> &Matrix {
        &self.weights
    }

    #[allow(clippy::cast_precision_loss)]
    fn held_out_log_likelihood(&self, held_out: &[FeatureMatrix]) -> Result<f64> {
        let rows: usize = held_out.iter().map(FeatureMatrix::n_rows).sum();
        Ok(-(rows as f64) * self.draw)
    }

    fn posterior(&self, _condition: usize, data: &FeatureMatrix) -> Result<Posterior> {
        Ok(Matrix::zeros(self.n_clusters, data.n_rows()))
    }
}

/// Draws a score per trial; fails for the listed cluster counts.
#[derive(Default)]
struct DrawEstimator {
    failing: Vec<usize>,
}

impl MixtureEstimator for DrawEstimator {
    type Model = DrawModel;

    fn fit<R: Rng + ?Sized>(
        &self,
        n_clusters: usize,
        training: &[FeatureMatrix],
        rng: &mut R,
    ) -> Result<DrawModel> {
        if self.failing.contains(&n_clusters) {
            return Err(Error::ModelFit(format!("scripted failure at k={n_clusters}")));
        }
        Ok(DrawModel {
            n_clusters,
            draw: rng.gen::<f64>(),
            weights: Matrix::zeros(training.len(), n_clusters),
        })
    }
}

fn datasets(sizes: &[usize]) -> Vec<FeatureMatrix> {
    sizes
        .iter()
        .map(|&n| Matrix::from_vec(n, 1, (0..n).map(|i| i as f64).collect()).unwrap())
        .collect()
}

fn config(counts: &[usize], repetitions: usize) -> RunConfig {
    RunConfig::builder()
        .cluster_counts(counts.iter().copied())
        .repetitions(repetitions)
        .train_size(20)
        .seed(11)
        .build()
        .unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_report_has_every_cluster_count_and_repetition() {
    let config = config(&[3, 4, 5], 2);
    let report = select(&DrawEstimator::default(), &datasets(&[100, 80]), &config).unwrap();

    assert_eq!(report.cluster_counts(), vec![3, 4, 5]);
    for k in [3, 4, 5] {
        assert_eq!(report.scores(k).len(), 2);
        assert_eq!(report.failure_count(k), 0);
        assert!(report.scores(k).iter().all(|s| s.is_finite() && *s <= 0.0));
    }
    assert!(report.config().is_some());
}

#[test]
fn test_more_repetitions_keep_earlier_scores() {
    let data = datasets(&[100, 80]);
    let estimator = DrawEstimator::default();
    let short = select(&estimator, &data, &config(&[3, 4], 2)).unwrap();
    let long = select(&estimator, &data, &config(&[3, 4], 4)).unwrap();

    for k in [3, 4] {
        assert_eq!(long.scores(k).len(), 4);
        assert_eq!(&long.scores(k)[..2], short.scores(k).as_slice());
    }
}

#[test]
fn test_cluster_count_order_does_not_change_scores() {
    let data = datasets(&[60, 60]);
    let estimator = DrawEstimator::default();
    let forward = select(&estimator, &data, &config(&[3, 4, 5], 2)).unwrap();
    let single = select(&estimator, &data, &config(&[5], 2)).unwrap();

    assert_eq!(forward.scores(5), single.scores(5));
}

#[test]
fn test_sequential_matches_parallel() {
    let data = datasets(&[90, 70]);
    let estimator = DrawEstimator::default();
    let parallel = select(&estimator, &data, &config(&[2, 3], 3)).unwrap();
    let sequential_config = boutmix::config::RunConfigBuilder::from_config(config(&[2, 3], 3))
        .parallel(false)
        .build()
        .unwrap();
    let sequential = select(&estimator, &data, &sequential_config).unwrap();

    for k in [2, 3] {
        assert_eq!(parallel.scores(k), sequential.scores(k));
    }
}

#[test]
fn test_failed_fits_are_recorded_and_sweep_continues() {
    let estimator = DrawEstimator { failing: vec![4] };
    let report = select(&estimator, &datasets(&[100, 80]), &config(&[3, 4, 5], 3)).unwrap();

    assert_eq!(report.failure_count(4), 3);
    assert!(report.scores(4).is_empty());
    assert_eq!(report.scores(3).len(), 3);
    assert_eq!(report.scores(5).len(), 3);

    let failures = report.failures();
    assert_eq!(failures.len(), 3);
    for record in failures {
        assert_eq!(record.id().cluster_count, 4);
        assert_eq!(record.status(), TrialStatus::Failed);
        assert!(record.error().unwrap().contains("scripted failure"));
    }

    let summary = report
        .summaries()
        .into_iter()
        .find(|s| s.cluster_count == 4)
        .unwrap();
    assert!(summary.mean.is_nan());
    assert_eq!(summary.failures, 3);
}

#[test]
fn test_held_out_uses_common_length() {
    // 2 conditions * (60 - 20) held-out rows, scaled by a draw in [0, 1)
    let report = select(&DrawEstimator::default(), &datasets(&[100, 60]), &config(&[2], 1)).unwrap();
    let score = report.scores(2)[0];
    assert!(score > -80.0 && score <= 0.0);
}

#[test]
fn test_undersized_condition_is_rejected() {
    let config = config(&[3], 1);
    let result = select(&DrawEstimator::default(), &datasets(&[100, 10]), &config);
    match result {
        Err(Error::InvalidSize { context, .. }) => assert!(context.contains("condition 1")),
        other => panic!("expected InvalidSize, got {other:?}"),
    }
}

#[test]
fn test_mismatched_feature_widths_rejected() {
    let data = vec![Matrix::zeros(50, 2), Matrix::zeros(50, 3)];
    let result = select(&DrawEstimator::default(), &data, &config(&[3], 1));
    assert!(matches!(result, Err(Error::DimensionMismatch(_))));
}

#[test]
fn test_no_datasets_rejected() {
    let result = select(&DrawEstimator::default(), &[], &config(&[3], 1));
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}

#[test]
fn test_repeated_cluster_count_rejected() {
    assert!(matches!(
        RunConfig::builder().cluster_counts([2, 2]).build(),
        Err(Error::InvalidConfig(_))
    ));

    // A deserialized config skips the builder; selection still refuses it.
    let mut value = serde_json::to_value(config(&[2], 1)).unwrap();
    value["cluster_counts"] = serde_json::json!([2, 2]);
    let config: RunConfig = serde_json::from_value(value).unwrap();
    let result = select(&DrawEstimator::default(), &datasets(&[50, 50]), &config);
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

#[test]
fn test_run_single_trial() {
    let config = config(&[3], 1);
    let estimator = DrawEstimator::default();
    let selector = ModelSelector::new(&estimator, &config);
    let record = selector.run_trial(&datasets(&[50, 50]), boutmix::selection::TrialId::new(3, 0));

    assert_eq!(record.status(), TrialStatus::Success);
    assert!(record.held_out_log_likelihood().is_some());
    assert!(record.ended_at() >= record.started_at());
}
