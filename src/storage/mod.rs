//! Storage backend (Arrow/Parquet)
//!
//! Each condition is stored as Parquet files named by condition index in a
//! data directory:
//!
//! - `data_condition{n}.parquet`: one row per bout, every column numeric
//!   (cast to `Float64`), column order is feature order.
//! - `tailangles_condition{n}.parquet` (optional): one row per bout frame.
//!   An integer `observation` column numbers the bouts `0, 1, 2, ...`, rows of
//!   one bout are contiguous and in frame order, an optional `frame` column is
//!   ignored and every other numeric column is a channel.

use crate::dataset::{ConditionData, DatasetStore};
use crate::matrix::{FeatureMatrix, RawSignalArray};
use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, Float64Array, Int64Array};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Column numbering the bouts of a raw-signal file.
pub const OBSERVATION_COLUMN: &str = "observation";
/// Optional frame-number column of a raw-signal file.
pub const FRAME_COLUMN: &str = "frame";

/// Path of condition `n`'s feature file.
#[must_use]
pub fn feature_path(dir: &Path, condition: usize) -> PathBuf {
    dir.join(format!("data_condition{condition}.parquet"))
}

/// Path of condition `n`'s raw-signal file.
#[must_use]
pub fn raw_signal_path(dir: &Path, condition: usize) -> PathBuf {
    dir.join(format!("tailangles_condition{condition}.parquet"))
}

/// Record batches of one Parquet file
pub struct StorageEngine {
    batches: Vec<RecordBatch>,
}

impl StorageEngine {
    /// Create a new storage engine from existing batches
    #[must_use]
    pub fn new(batches: Vec<RecordBatch>) -> Self {
        Self { batches }
    }

    /// Load table from Parquet file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            Error::StorageError(format!("Failed to open Parquet file {}: {e}", path.display()))
        })?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| {
            Error::StorageError(format!("Failed to parse Parquet file {}: {e}", path.display()))
        })?;

        let reader = builder.build().map_err(|e| {
            Error::StorageError(format!("Failed to create Parquet reader: {e}"))
        })?;

        let mut storage = Self::new(Vec::new());
        for batch in reader {
            let batch = batch.map_err(|e| {
                Error::StorageError(format!("Failed to read record batch: {e}"))
            })?;
            storage.append_batch(batch)?;
        }

        debug!(path = %path.display(), batches = storage.batches.len(), "loaded parquet");
        Ok(storage)
    }

    /// Total rows over all batches
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Append a batch
    ///
    /// # Errors
    ///
    /// Returns error if batch schema doesn't match existing batches
    pub fn append_batch(&mut self, batch: RecordBatch) -> Result<()> {
        if let Some(first) = self.batches.first() {
            if batch.schema() != first.schema() {
                return Err(Error::StorageError(format!(
                    "Schema mismatch: expected {:?}, got {:?}",
                    first.schema(),
                    batch.schema()
                )));
            }
        }
        self.batches.push(batch);
        Ok(())
    }

    /// Interpret the table as a feature matrix (rows = bouts).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for non-numeric columns or null values.
    pub fn to_feature_matrix(&self) -> Result<FeatureMatrix> {
        let Some(first) = self.batches.first() else {
            return FeatureMatrix::from_vec(0, 0, Vec::new());
        };
        let n_cols = first.num_columns();
        let columns: Vec<Vec<f64>> = (0..n_cols)
            .map(|j| self.concat_f64(j))
            .collect::<Result<_>>()?;

        let n_rows = self.num_rows();
        let mut data = Vec::with_capacity(n_rows * n_cols);
        for i in 0..n_rows {
            data.extend(columns.iter().map(|col| col[i]));
        }
        FeatureMatrix::from_vec(n_rows, n_cols, data)
    }

    /// Interpret the table as a raw-signal array (rows = bout frames).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the observation column is missing or the
    /// bouts are not numbered `0, 1, 2, ...` in contiguous runs, and
    /// `DimensionMismatch` if bouts have different frame counts.
    pub fn to_raw_signal(&self) -> Result<RawSignalArray> {
        let Some(first) = self.batches.first() else {
            return RawSignalArray::from_vec(0, 0, 0, Vec::new());
        };
        let schema = first.schema();
        let obs_idx = schema.index_of(OBSERVATION_COLUMN).map_err(|_| {
            Error::StorageError(format!("raw signal needs an '{OBSERVATION_COLUMN}' column"))
        })?;
        let channel_idx: Vec<usize> = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, f)| f.name() != OBSERVATION_COLUMN && f.name() != FRAME_COLUMN)
            .map(|(j, _)| j)
            .collect();

        let observations = self.concat_i64(obs_idx)?;
        let channels: Vec<Vec<f64>> = channel_idx
            .iter()
            .map(|&j| self.concat_f64(j))
            .collect::<Result<_>>()?;

        // run lengths of consecutive equal observation ids
        let mut frames_per_obs: Vec<usize> = Vec::new();
        let mut current: Option<i64> = None;
        for &id in &observations {
            if current == Some(id) {
                if let Some(last) = frames_per_obs.last_mut() {
                    *last += 1;
                }
                continue;
            }
            let expected = i64::try_from(frames_per_obs.len()).unwrap_or(i64::MAX);
            if id != expected {
                return Err(Error::StorageError(format!(
                    "observation ids must run 0, 1, 2, ... in contiguous blocks; found {id} where {expected} was expected"
                )));
            }
            frames_per_obs.push(1);
            current = Some(id);
        }

        let n_frames = frames_per_obs.first().copied().unwrap_or(0);
        if let Some((obs, &n)) = frames_per_obs.iter().enumerate().find(|&(_, &n)| n != n_frames) {
            return Err(Error::DimensionMismatch(format!(
                "observation {obs} has {n} frames, observation 0 has {n_frames}"
            )));
        }

        let n_channels = channels.len();
        let mut data = Vec::with_capacity(observations.len() * n_channels);
        for row in 0..observations.len() {
            data.extend(channels.iter().map(|col| col[row]));
        }
        RawSignalArray::from_vec(frames_per_obs.len(), n_frames, n_channels, data)
    }

    fn concat_f64(&self, column: usize) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(self.num_rows());
        for batch in &self.batches {
            let array = numeric_column(batch, column, &DataType::Float64)?;
            let values = array
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| Error::Other("Failed to downcast to Float64Array".to_string()))?;
            out.extend(values.values().iter().copied());
        }
        Ok(out)
    }

    fn concat_i64(&self, column: usize) -> Result<Vec<i64>> {
        let mut out = Vec::with_capacity(self.num_rows());
        for batch in &self.batches {
            let array = numeric_column(batch, column, &DataType::Int64)?;
            let values = array
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| Error::Other("Failed to downcast to Int64Array".to_string()))?;
            out.extend(values.values().iter().copied());
        }
        Ok(out)
    }
}

/// Column `index` of `batch` cast to `to`; rejects non-numeric and null data.
fn numeric_column(batch: &RecordBatch, index: usize, to: &DataType) -> Result<ArrayRef> {
    let schema = batch.schema();
    let field = schema.field(index);
    let column = batch.column(index);
    if !column.data_type().is_numeric() {
        return Err(Error::StorageError(format!(
            "column '{}' has non-numeric type {:?}",
            field.name(),
            column.data_type()
        )));
    }
    if column.null_count() > 0 {
        return Err(Error::StorageError(format!(
            "column '{}' contains {} null values",
            field.name(),
            column.null_count()
        )));
    }
    Ok(cast(column, to)?)
}

/// Feature matrix as a record batch with columns `f0, f1, ...`.
///
/// # Errors
///
/// Returns an Arrow error if the batch cannot be assembled.
pub fn feature_batch(features: &FeatureMatrix) -> Result<RecordBatch> {
    let fields: Vec<Field> = (0..features.n_cols())
        .map(|j| Field::new(format!("f{j}"), DataType::Float64, false))
        .collect();
    let columns: Vec<ArrayRef> = (0..features.n_cols())
        .map(|j| Arc::new(Float64Array::from(features.column(j))) as ArrayRef)
        .collect();
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Raw signal as a record batch with `observation`, `frame` and one column
/// per channel (`c0, c1, ...`).
///
/// # Errors
///
/// Returns an Arrow error if the batch cannot be assembled.
pub fn raw_signal_batch(raw: &RawSignalArray) -> Result<RecordBatch> {
    let rows = raw.n_observations() * raw.n_frames();
    let to_i64 = |v: usize| i64::try_from(v).unwrap_or(i64::MAX);
    let observation: Vec<i64> = (0..rows).map(|r| to_i64(r / raw.n_frames().max(1))).collect();
    let frame: Vec<i64> = (0..rows).map(|r| to_i64(r % raw.n_frames().max(1))).collect();

    let mut fields = vec![
        Field::new(OBSERVATION_COLUMN, DataType::Int64, false),
        Field::new(FRAME_COLUMN, DataType::Int64, false),
    ];
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(observation)),
        Arc::new(Int64Array::from(frame)),
    ];
    for ch in 0..raw.n_channels() {
        let values: Vec<f64> = (0..raw.n_observations())
            .flat_map(|obs| {
                raw.observation(obs)
                    .chunks_exact(raw.n_channels())
                    .map(move |f| f[ch])
            })
            .collect();
        fields.push(Field::new(format!("c{ch}"), DataType::Float64, false));
        columns.push(Arc::new(Float64Array::from(values)));
    }
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Write one record batch to a Parquet file.
///
/// # Errors
///
/// Returns an IO or Parquet error if the file cannot be written.
pub fn write_parquet<P: AsRef<Path>>(path: P, batch: &RecordBatch) -> Result<()> {
    use parquet::arrow::ArrowWriter;

    let file = File::create(path.as_ref())?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

/// Write a feature matrix in the `data_condition{n}.parquet` layout.
///
/// # Errors
///
/// Returns an IO or Parquet error if the file cannot be written.
pub fn write_feature_parquet<P: AsRef<Path>>(path: P, features: &FeatureMatrix) -> Result<()> {
    write_parquet(path, &feature_batch(features)?)
}

/// Write a raw signal in the `tailangles_condition{n}.parquet` layout.
///
/// # Errors
///
/// Returns an IO or Parquet error if the file cannot be written.
pub fn write_raw_signal_parquet<P: AsRef<Path>>(path: P, raw: &RawSignalArray) -> Result<()> {
    write_parquet(path, &raw_signal_batch(raw)?)
}

/// Load conditions `0..n_conditions` from `dir`.
///
/// Raw-signal files are optional per condition.
///
/// # Errors
///
/// Returns `StorageError` if a feature file is missing or malformed and
/// `DimensionMismatch` if the loaded data is inconsistent.
pub fn load_dataset_store(dir: &Path, n_conditions: usize) -> Result<DatasetStore> {
    let mut conditions = Vec::with_capacity(n_conditions);
    for c in 0..n_conditions {
        let features = StorageEngine::load_parquet(feature_path(dir, c))?.to_feature_matrix()?;
        let raw_path = raw_signal_path(dir, c);
        let data = if raw_path.exists() {
            let raw = StorageEngine::load_parquet(&raw_path)?.to_raw_signal()?;
            ConditionData::with_raw(features, raw).map_err(|e| match e {
                Error::DimensionMismatch(msg) => {
                    Error::DimensionMismatch(format!("condition {c}: {msg}"))
                }
                other => other,
            })?
        } else {
            ConditionData::new(features)
        };
        info!(
            condition = c,
            bouts = data.len(),
            features = data.features().n_cols(),
            raw_signal = data.raw().is_some(),
            "loaded condition"
        );
        conditions.push(data);
    }
    DatasetStore::new(conditions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix;
    use arrow::array::{Float32Array, Int32Array, StringArray};

    #[test]
    fn test_feature_matrix_from_mixed_numeric_batch() {
        let schema = Schema::new(vec![
            Field::new("speed", DataType::Float32, false),
            Field::new("turn", DataType::Int32, false),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Float32Array::from(vec![1.5, 2.5])),
                Arc::new(Int32Array::from(vec![10, 20])),
            ],
        )
        .unwrap();
        let m = StorageEngine::new(vec![batch]).to_feature_matrix().unwrap();
        assert_eq!(m.shape(), (2, 2));
        assert_eq!(m.as_slice(), &[1.5, 10.0, 2.5, 20.0]);
    }

    #[test]
    fn test_non_numeric_column_rejected() {
        let schema = Schema::new(vec![Field::new("name", DataType::Utf8, false)]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(StringArray::from(vec!["a"]))],
        )
        .unwrap();
        let result = StorageEngine::new(vec![batch]).to_feature_matrix();
        assert!(matches!(result, Err(Error::StorageError(_))));
    }

    #[test]
    fn test_append_batch_schema_validation() {
        let m = Matrix::zeros(3, 2);
        let mut storage = StorageEngine::new(vec![]);
        storage.append_batch(feature_batch(&m).unwrap()).unwrap();
        let other = feature_batch(&Matrix::zeros(3, 1)).unwrap();
        let result = storage.append_batch(other);
        assert!(result.unwrap_err().to_string().contains("Schema mismatch"));
    }

    #[test]
    fn test_multiple_batches_concatenate() {
        let a = Matrix::from_rows(&[vec![1.0, 2.0]]).unwrap();
        let b = Matrix::from_rows(&[vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        let storage = StorageEngine::new(vec![feature_batch(&a).unwrap(), feature_batch(&b).unwrap()]);
        let m = storage.to_feature_matrix().unwrap();
        assert_eq!(m.shape(), (3, 2));
        assert_eq!(m.row(2), &[5.0, 6.0]);
    }

    #[test]
    fn test_raw_signal_batch_layout() {
        let raw = RawSignalArray::from_vec(2, 3, 2, (0..12).map(f64::from).collect()).unwrap();
        let storage = StorageEngine::new(vec![raw_signal_batch(&raw).unwrap()]);
        let back = storage.to_raw_signal().unwrap();
        assert_eq!(back.n_observations(), 2);
        assert_eq!(back.n_frames(), 3);
        assert_eq!(back.n_channels(), 2);
        assert_eq!(back.trace(1, 1).unwrap(), vec![7.0, 9.0, 11.0]);
    }

    #[test]
    fn test_raw_signal_requires_ordered_observations() {
        let schema = Schema::new(vec![
            Field::new(OBSERVATION_COLUMN, DataType::Int64, false),
            Field::new("c0", DataType::Float64, false),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int64Array::from(vec![0, 1, 0])),
                Arc::new(Float64Array::from(vec![0.0, 1.0, 2.0])),
            ],
        )
        .unwrap();
        let result = StorageEngine::new(vec![batch]).to_raw_signal();
        assert!(matches!(result, Err(Error::StorageError(_))));
    }

    #[test]
    fn test_raw_signal_unequal_frames() {
        let schema = Schema::new(vec![
            Field::new(OBSERVATION_COLUMN, DataType::Int64, false),
            Field::new("c0", DataType::Float64, false),
        ]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int64Array::from(vec![0, 0, 1])),
                Arc::new(Float64Array::from(vec![0.0, 1.0, 2.0])),
            ],
        )
        .unwrap();
        let result = StorageEngine::new(vec![batch]).to_raw_signal();
        assert!(matches!(result, Err(Error::DimensionMismatch(_))));
    }
}
