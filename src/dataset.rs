//! Dataset store: one feature matrix (and optional raw signal array) per
//! experimental condition, loaded once and read-only afterwards.

use crate::matrix::{FeatureMatrix, RawSignalArray};
use crate::{Error, Result};

/// Data for a single experimental condition.
#[derive(Debug, Clone)]
pub struct ConditionData {
    features: FeatureMatrix,
    raw: Option<RawSignalArray>,
}

impl ConditionData {
    /// Condition with features only.
    #[must_use]
    pub const fn new(features: FeatureMatrix) -> Self {
        Self {
            features,
            raw: None,
        }
    }

    /// Condition with features and an aligned raw signal array.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the raw signal does not have one entry
    /// per feature row.
    pub fn with_raw(features: FeatureMatrix, raw: RawSignalArray) -> Result<Self> {
        if raw.n_observations() != features.n_rows() {
            return Err(Error::DimensionMismatch(format!(
                "raw signal has {} observations but feature matrix has {} rows",
                raw.n_observations(),
                features.n_rows()
            )));
        }
        Ok(Self {
            features,
            raw: Some(raw),
        })
    }

    /// Feature matrix (observations x features).
    #[must_use]
    pub const fn features(&self) -> &FeatureMatrix {
        &self.features
    }

    /// Raw signal array, if one was loaded.
    #[must_use]
    pub const fn raw(&self) -> Option<&RawSignalArray> {
        self.raw.as_ref()
    }

    /// Number of observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.n_rows()
    }

    /// True if the condition has no observations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.n_rows() == 0
    }
}

/// All conditions of a run, indexed by condition number.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    conditions: Vec<ConditionData>,
}

impl DatasetStore {
    /// Build a store, checking that every condition has the same feature width.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty condition list and
    /// `DimensionMismatch` for inconsistent feature widths.
    pub fn new(conditions: Vec<ConditionData>) -> Result<Self> {
        let Some(first) = conditions.first() else {
            return Err(Error::InvalidInput(
                "dataset store needs at least one condition".to_string(),
            ));
        };
        let width = first.features().n_cols();
        for (c, data) in conditions.iter().enumerate() {
            if data.features().n_cols() != width {
                return Err(Error::DimensionMismatch(format!(
                    "condition {c} has {} features, condition 0 has {width}",
                    data.features().n_cols()
                )));
            }
        }
        Ok(Self { conditions })
    }

    /// Number of conditions.
    #[must_use]
    pub fn n_conditions(&self) -> usize {
        self.conditions.len()
    }

    /// Feature-vector length shared by all conditions.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.conditions[0].features().n_cols()
    }

    /// Data for one condition.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the condition does not exist.
    pub fn condition(&self, condition: usize) -> Result<&ConditionData> {
        self.conditions.get(condition).ok_or_else(|| {
            Error::InvalidInput(format!(
                "condition {condition} out of range ({} conditions loaded)",
                self.conditions.len()
            ))
        })
    }

    /// Iterate over conditions in index order.
    pub fn iter(&self) -> impl Iterator<Item = &ConditionData> {
        self.conditions.iter()
    }

    /// Feature matrices in condition order.
    #[must_use]
    pub fn feature_matrices(&self) -> Vec<FeatureMatrix> {
        self.conditions.iter().map(|c| c.features().clone()).collect()
    }

    /// Smallest observation count over all conditions.
    #[must_use]
    pub fn min_observations(&self) -> usize {
        self.conditions.iter().map(ConditionData::len).min().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix;

    #[test]
    fn test_store_rejects_mismatched_widths() {
        let a = ConditionData::new(Matrix::zeros(3, 2));
        let b = ConditionData::new(Matrix::zeros(3, 4));
        let result = DatasetStore::new(vec![a, b]);
        assert!(matches!(result, Err(Error::DimensionMismatch(_))));
    }

    #[test]
    fn test_store_rejects_empty() {
        assert!(DatasetStore::new(vec![]).is_err());
    }

    #[test]
    fn test_raw_alignment_checked() {
        let raw = RawSignalArray::from_vec(2, 1, 1, vec![0.0, 1.0]).unwrap();
        let result = ConditionData::with_raw(Matrix::zeros(3, 2), raw);
        assert!(matches!(result, Err(Error::DimensionMismatch(_))));
    }

    #[test]
    fn test_min_observations() {
        let store = DatasetStore::new(vec![
            ConditionData::new(Matrix::zeros(10, 2)),
            ConditionData::new(Matrix::zeros(7, 2)),
        ])
        .unwrap();
        assert_eq!(store.n_conditions(), 2);
        assert_eq!(store.n_features(), 2);
        assert_eq!(store.min_observations(), 7);
        assert!(store.condition(2).is_err());
    }
}
