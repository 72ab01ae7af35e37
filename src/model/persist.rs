//! Model parameter persistence
//!
//! A saved model is three JSON array files sharing a base path:
//! `<base>_means.json`, `<base>_covars.json` and `<base>_weights.json`.
//! There is no schema version; the cluster count is implied by the shapes.

use super::{GaussianMixture, MixtureModel};
use crate::matrix::Matrix;
use crate::{Error, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// File suffixes of the three parameter arrays.
pub const ARTIFACT_SUFFIXES: [&str; 3] = ["_means.json", "_covars.json", "_weights.json"];

/// An n-dimensional array stored as its shape plus row-major data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayFile {
    /// Dimension sizes, outermost first.
    pub shape: Vec<usize>,
    /// Row-major values.
    pub data: Vec<f64>,
}

impl ArrayFile {
    fn from_matrix(m: &Matrix) -> Self {
        Self {
            shape: vec![m.n_rows(), m.n_cols()],
            data: m.as_slice().to_vec(),
        }
    }

    fn into_matrix(self, name: &str) -> Result<Matrix> {
        let Self { shape, data } = self;
        match shape.as_slice() {
            &[rows, cols] => Matrix::from_vec(rows, cols, data),
            _ => Err(Error::DimensionMismatch(format!(
                "{name} must be 2-dimensional, got shape {shape:?}"
            ))),
        }
    }

    fn write(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::StorageError(format!("Failed to open {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

/// Paths of the means, covariances and weights files for `base`.
#[must_use]
pub fn artifact_paths(base: &Path) -> [PathBuf; 3] {
    ARTIFACT_SUFFIXES.map(|suffix| {
        let mut name = base.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    })
}

/// A model that can be written to and read back from disk.
pub trait PersistentModel: MixtureModel + Sized {
    /// Write the parameters under `base`, returning the files written.
    ///
    /// # Errors
    ///
    /// Returns an IO or JSON error if a file cannot be written.
    fn save(&self, base: &Path) -> Result<[PathBuf; 3]>;

    /// Rebuild a model from files written by [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for missing files and `DimensionMismatch` if the
    /// three arrays disagree on shape.
    fn load(base: &Path) -> Result<Self>;
}

impl PersistentModel for GaussianMixture {
    fn save(&self, base: &Path) -> Result<[PathBuf; 3]> {
        let [means_path, covars_path, weights_path] = artifact_paths(base);
        let (k, d) = self.means().shape();

        let covars = ArrayFile {
            shape: vec![k, d, d],
            data: self
                .covariances()
                .iter()
                .flat_map(|c| Matrix::from_nalgebra(c).into_vec())
                .collect(),
        };

        ArrayFile::from_matrix(self.means()).write(&means_path)?;
        covars.write(&covars_path)?;
        ArrayFile::from_matrix(self.weights()).write(&weights_path)?;

        info!(base = %base.display(), clusters = k, "saved model parameters");
        Ok([means_path, covars_path, weights_path])
    }

    fn load(base: &Path) -> Result<Self> {
        let [means_path, covars_path, weights_path] = artifact_paths(base);
        let means = ArrayFile::read(&means_path)?.into_matrix("means")?;
        let weights = ArrayFile::read(&weights_path)?.into_matrix("weights")?;
        let covars = ArrayFile::read(&covars_path)?;

        let (k, d) = means.shape();
        if d == 0 {
            return Err(Error::DimensionMismatch(format!(
                "means of shape ({k}, {d}) have no features"
            )));
        }
        if covars.shape != [k, d, d] || covars.data.len() != k * d * d {
            return Err(Error::DimensionMismatch(format!(
                "covariances of shape {:?} with {} values do not match means of shape ({k}, {d})",
                covars.shape,
                covars.data.len()
            )));
        }
        let covariances = covars
            .data
            .chunks_exact(d * d)
            .map(|block| DMatrix::from_row_slice(d, d, block))
            .collect();

        Self::from_parameters(means, covariances, weights)
    }
}
