//! Error types for boutmix
//!
//! Messages carry the condition, cluster count or file involved so a failed
//! run can be traced back to its input.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// boutmix error types
#[derive(Error, Debug)]
pub enum Error {
    /// A split or subsample size is inconsistent with the available data
    #[error("Invalid size for {context}: requested {requested}, available {available}")]
    InvalidSize {
        /// What was being sized (e.g. "training split of condition 1")
        context: String,
        /// Requested number of observations
        requested: usize,
        /// Number of observations actually available
        available: usize,
    },

    /// The mixture estimator failed (non-convergence, degenerate input)
    #[error("Model fit failed: {0}")]
    ModelFit(String),

    /// Feature widths or observation counts disagree
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Run configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid argument to an operation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage error (Parquet/Arrow layout)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for an [`Error::InvalidSize`].
    pub(crate) fn invalid_size(context: impl Into<String>, requested: usize, available: usize) -> Self {
        Self::InvalidSize {
            context: context.into(),
            requested,
            available,
        }
    }
}
