//! Dense matrices for feature data, posteriors and model parameters
//!
//! [`Matrix`] keeps its values in a `nalgebra::DMatrix` whose columns are the
//! matrix rows, so each observation is one contiguous column and
//! [`Matrix::as_slice`] reads in row-major order.

use crate::{Error, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Dense `f64` matrix with row-major semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MatrixData", into = "MatrixData")]
pub struct Matrix {
    /// `n_cols x n_rows`; column `i` is row `i`.
    inner: DMatrix<f64>,
}

/// Serialized form of [`Matrix`].
#[derive(Serialize, Deserialize)]
struct MatrixData {
    n_rows: usize,
    n_cols: usize,
    data: Vec<f64>,
}

impl TryFrom<MatrixData> for Matrix {
    type Error = Error;

    fn try_from(m: MatrixData) -> Result<Self> {
        Self::from_vec(m.n_rows, m.n_cols, m.data)
    }
}

impl From<Matrix> for MatrixData {
    fn from(m: Matrix) -> Self {
        let (n_rows, n_cols) = m.shape();
        Self {
            n_rows,
            n_cols,
            data: m.into_vec(),
        }
    }
}

/// Feature matrix: one row per observation (bout), one column per feature.
pub type FeatureMatrix = Matrix;

impl Matrix {
    /// Create a matrix from row-major data.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if `data.len() != n_rows * n_cols`.
    pub fn from_vec(n_rows: usize, n_cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != n_rows * n_cols {
            return Err(Error::DimensionMismatch(format!(
                "expected {n_rows}x{n_cols} = {} values, got {}",
                n_rows * n_cols,
                data.len()
            )));
        }
        Ok(Self {
            inner: DMatrix::from_vec(n_cols, n_rows, data),
        })
    }

    /// Create a matrix from a slice of equally sized rows.
    ///
    /// An empty slice yields a `0 x 0` matrix.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if rows have different lengths.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self> {
        let n_cols = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * n_cols);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != n_cols {
                return Err(Error::DimensionMismatch(format!(
                    "row {i} has {} columns, expected {n_cols}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Self::from_vec(rows.len(), n_cols, data)
    }

    /// Copy of an `nalgebra` matrix with the same shape.
    #[must_use]
    pub fn from_nalgebra(m: &DMatrix<f64>) -> Self {
        Self {
            inner: m.transpose(),
        }
    }

    /// Matrix whose rows are the columns of `m`.
    #[must_use]
    pub const fn from_observations(m: DMatrix<f64>) -> Self {
        Self { inner: m }
    }

    /// All-zero matrix.
    #[must_use]
    pub fn zeros(n_rows: usize, n_cols: usize) -> Self {
        Self {
            inner: DMatrix::zeros(n_cols, n_rows),
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.inner.ncols()
    }

    /// Number of columns.
    #[must_use]
    pub fn n_cols(&self) -> usize {
        self.inner.nrows()
    }

    /// `(rows, cols)`
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows(), self.n_cols())
    }

    /// Values in row-major order.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        self.inner.as_slice()
    }

    /// Consume the matrix, returning its row-major data.
    #[must_use]
    pub fn into_vec(self) -> Vec<f64> {
        self.inner.data.into()
    }

    /// Rows as the columns of an `n_cols x n_rows` `nalgebra` matrix.
    #[must_use]
    pub const fn observations(&self) -> &DMatrix<f64> {
        &self.inner
    }

    /// Copy as an `nalgebra` matrix with the same shape.
    #[must_use]
    pub fn to_nalgebra(&self) -> DMatrix<f64> {
        self.inner.transpose()
    }

    /// Element at `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        assert!(row < self.n_rows() && col < self.n_cols(), "index out of bounds");
        self.inner[(col, row)]
    }

    /// Set the element at `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds.
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        assert!(row < self.n_rows() && col < self.n_cols(), "index out of bounds");
        self.inner[(col, row)] = value;
    }

    /// Borrow one row.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    #[must_use]
    pub fn row(&self, row: usize) -> &[f64] {
        let n_cols = self.n_cols();
        &self.inner.as_slice()[row * n_cols..(row + 1) * n_cols]
    }

    /// Iterate over rows.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.n_rows()).map(move |i| self.row(i))
    }

    /// Copy of one column.
    #[must_use]
    pub fn column(&self, col: usize) -> Vec<f64> {
        self.inner.row(col).iter().copied().collect()
    }

    /// New matrix made of the given rows, in the given order.
    ///
    /// Repeated indices produce repeated rows.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if any index is out of range.
    pub fn select_rows(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&i) = indices.iter().find(|&&i| i >= self.n_rows()) {
            return Err(Error::InvalidInput(format!(
                "row index {i} out of range for {} rows",
                self.n_rows()
            )));
        }
        Ok(Self {
            inner: self.inner.select_columns(indices),
        })
    }
}

/// Raw per-observation signal: `observations x frames x channels`.
///
/// Row `i` is aligned with row `i` of the condition's feature matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSignalArray {
    n_observations: usize,
    n_frames: usize,
    n_channels: usize,
    data: Vec<f64>,
}

impl RawSignalArray {
    /// Create from observation-major, then frame-major, then channel data.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the data length does not match the shape.
    pub fn from_vec(
        n_observations: usize,
        n_frames: usize,
        n_channels: usize,
        data: Vec<f64>,
    ) -> Result<Self> {
        let expected = n_observations * n_frames * n_channels;
        if data.len() != expected {
            return Err(Error::DimensionMismatch(format!(
                "raw signal shape {n_observations}x{n_frames}x{n_channels} needs {expected} values, got {}",
                data.len()
            )));
        }
        Ok(Self {
            n_observations,
            n_frames,
            n_channels,
            data,
        })
    }

    /// Number of observations.
    #[must_use]
    pub const fn n_observations(&self) -> usize {
        self.n_observations
    }

    /// Frames per observation.
    #[must_use]
    pub const fn n_frames(&self) -> usize {
        self.n_frames
    }

    /// Channels per frame.
    #[must_use]
    pub const fn n_channels(&self) -> usize {
        self.n_channels
    }

    /// The `frames x channels` block of one observation.
    #[must_use]
    pub fn observation(&self, obs: usize) -> &[f64] {
        let stride = self.n_frames * self.n_channels;
        &self.data[obs * stride..(obs + 1) * stride]
    }

    /// One channel of one observation over all frames.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `obs` or `channel` is out of range.
    pub fn trace(&self, obs: usize, channel: usize) -> Result<Vec<f64>> {
        if obs >= self.n_observations || channel >= self.n_channels {
            return Err(Error::InvalidInput(format!(
                "trace ({obs}, channel {channel}) out of range for {} observations x {} channels",
                self.n_observations, self.n_channels
            )));
        }
        Ok(self
            .observation(obs)
            .chunks_exact(self.n_channels)
            .map(|frame| frame[channel])
            .collect())
    }

    /// New array made of the given observations, in the given order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if any index is out of range.
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        let stride = self.n_frames * self.n_channels;
        let mut data = Vec::with_capacity(indices.len() * stride);
        for &i in indices {
            if i >= self.n_observations {
                return Err(Error::InvalidInput(format!(
                    "observation index {i} out of range for {} observations",
                    self.n_observations
                )));
            }
            data.extend_from_slice(self.observation(i));
        }
        Ok(Self {
            n_observations: indices.len(),
            n_frames: self.n_frames,
            n_channels: self.n_channels,
            data,
        })
    }
}
