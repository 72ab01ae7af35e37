//! End-to-end runs: model selection, training (or loading) and kinematic
//! analysis of one condition.

use crate::aggregate::KinematicReport;
use crate::assign::assign;
use crate::config::RunConfig;
use crate::dataset::DatasetStore;
use crate::matrix::FeatureMatrix;
use crate::model::{GaussianMixture, GaussianMixtureEstimator, MixtureEstimator, MixtureModel, PersistentModel};
use crate::selection::{ModelSelector, SelectionReport};
use crate::split::draw_train;
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// File name of the selection report inside the output directory.
pub const SELECTION_REPORT_FILE: &str = "heldout_ll.json";

/// Whether training fits a new model or reads saved parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainMode {
    /// Fit on a fresh training subsample and save the parameters.
    Learn,
    /// Load parameters saved by an earlier `Learn` run.
    Load,
}

/// Draw `train_size` training rows from every condition.
///
/// # Errors
///
/// Returns `InvalidSize` naming the first condition that is too small.
pub fn draw_training_set<R: Rng + ?Sized>(
    store: &DatasetStore,
    config: &RunConfig,
    rng: &mut R,
) -> Result<Vec<FeatureMatrix>> {
    store
        .iter()
        .enumerate()
        .map(|(c, data)| {
            let idx = draw_train(data.len(), config.train_size(), config.sampling(), rng).map_err(
                |_| {
                    Error::invalid_size(
                        format!("training subsample of condition {c}"),
                        config.train_size(),
                        data.len(),
                    )
                },
            )?;
            data.features().select_rows(&idx)
        })
        .collect()
}

/// Fit `config.n_clusters()` clusters on one training subsample per condition.
///
/// # Errors
///
/// Returns `InvalidSize` for undersized conditions and propagates fit errors.
pub fn train<E: MixtureEstimator, R: Rng + ?Sized>(
    estimator: &E,
    store: &DatasetStore,
    config: &RunConfig,
    rng: &mut R,
) -> Result<E::Model> {
    let training = draw_training_set(store, config, rng)?;
    info!(
        clusters = config.n_clusters(),
        conditions = training.len(),
        train_size = config.train_size(),
        "fitting mixture model"
    );
    estimator.fit(config.n_clusters(), &training, rng)
}

/// Fit and save a model, or load a saved one, depending on `mode`.
///
/// # Errors
///
/// Propagates fit, IO and parameter-format errors.
pub fn learn_or_load(store: &DatasetStore, config: &RunConfig, mode: TrainMode) -> Result<GaussianMixture> {
    let base = config.model_base_path();
    match mode {
        TrainMode::Learn => {
            let estimator = GaussianMixtureEstimator::new(config.estimator().clone());
            let mut rng = StdRng::seed_from_u64(config.seed());
            let model = train(&estimator, store, config, &mut rng)?;
            std::fs::create_dir_all(config.out_dir())?;
            model.save(&base)?;
            Ok(model)
        }
        TrainMode::Load => {
            let model = GaussianMixture::load(&base)?;
            if model.n_clusters() != config.n_clusters() {
                warn!(
                    loaded = model.n_clusters(),
                    configured = config.n_clusters(),
                    "loaded model has a different cluster count than configured"
                );
            }
            info!(base = %base.display(), clusters = model.n_clusters(), "loaded model parameters");
            Ok(model)
        }
    }
}

/// Score every configured cluster count and write the report to
/// `out_dir/heldout_ll.json`.
///
/// # Errors
///
/// Propagates selection and IO errors.
pub fn run_selection(store: &DatasetStore, config: &RunConfig) -> Result<SelectionReport> {
    let estimator = GaussianMixtureEstimator::new(config.estimator().clone());
    let report = ModelSelector::new(&estimator, config).select(&store.feature_matrices())?;

    std::fs::create_dir_all(config.out_dir())?;
    let path = config.out_dir().join(SELECTION_REPORT_FILE);
    report.write_json(&path)?;
    info!(path = %path.display(), "wrote selection report");
    Ok(report)
}

/// Assign the configured condition's bouts to states and summarise their
/// kinematics.
///
/// # Errors
///
/// Propagates assignment and aggregation errors.
pub fn analyze<M: MixtureModel + ?Sized>(
    model: &M,
    store: &DatasetStore,
    config: &RunConfig,
) -> Result<KinematicReport> {
    let condition = config.condition();
    let data = store.condition(condition)?;
    let assignment = assign(model, condition, data.features())?;
    KinematicReport::build(
        condition,
        &assignment,
        data.features(),
        data.raw(),
        model.weights(),
        config.kinematics(),
    )
}

/// Write a kinematic report to `out_dir/kinematics_condition{c}.json`.
///
/// # Errors
///
/// Returns an IO or JSON error if the file cannot be written.
pub fn write_kinematic_report(report: &KinematicReport, config: &RunConfig) -> Result<PathBuf> {
    std::fs::create_dir_all(config.out_dir())?;
    let path = config
        .out_dir()
        .join(format!("kinematics_condition{}.json", report.condition));
    std::fs::write(&path, serde_json::to_string_pretty(report)?)?;
    for state in &report.states {
        info!(
            state = state.state,
            bouts = state.count,
            mean_speed = state.mean_speed,
            mean_heading = state.mean_heading,
            weights = ?state.condition_weights,
            "state kinematics"
        );
    }
    Ok(path)
}
