//! # boutmix: Behavioral State Discovery with Mixture Models
//!
//! boutmix fits a Gaussian mixture to kinematic feature vectors of movement
//! bouts recorded under several experimental conditions, assigns each bout to
//! a discrete behavioral state, and chooses the number of states by
//! cross-validated held-out log-likelihood.
//!
//! ## Pipeline
//!
//! ```text
//! DatasetStore ─> split ─> ModelSelector (cluster-count sweep)
//!                                │
//!                       chosen cluster count
//!                                │
//!                 train / load ─> assign ─> aggregate ─> KinematicReport
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use boutmix::config::RunConfig;
//! use boutmix::pipeline::{analyze, learn_or_load, run_selection, TrainMode};
//! use boutmix::storage::load_dataset_store;
//!
//! let config = RunConfig::builder()
//!     .data_dir("data")
//!     .out_dir("out")
//!     .cluster_counts(3..=10)
//!     .build()?;
//! let store = load_dataset_store(config.data_dir(), config.n_conditions())?;
//!
//! // Score candidate cluster counts
//! let report = run_selection(&store, &config)?;
//! for s in report.summaries() {
//!     println!("{} clusters: {:.1} ± {:.1}", s.cluster_count, s.mean, s.std);
//! }
//!
//! // Fit the chosen model and summarise bout kinematics per state
//! let model = learn_or_load(&store, &config, TrainMode::Learn)?;
//! let kinematics = analyze(&model, &store, &config)?;
//! println!("occupancy: {:?}", kinematics.occupancy);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod aggregate;
pub mod assign;
pub mod config;
pub mod dataset;
pub mod error;
pub mod matrix;
pub mod model;
pub mod pipeline;
pub mod selection;
pub mod split;
pub mod storage;

pub use error::{Error, Result};
