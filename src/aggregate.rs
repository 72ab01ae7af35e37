//! Kinematic aggregation by state
//!
//! Observations are partitioned by their state label; each group collects the
//! speed and heading feature values and the raw-signal trace of its bouts.
//! Summaries are pure reductions over the groups. An empty group summarises
//! to NaN (means, densities, traces), which is a valid result.

use crate::assign::StateAssignment;
use crate::config::KinematicConfig;
use crate::matrix::{FeatureMatrix, Matrix, RawSignalArray};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Observations of one state and their kinematic values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateGroup {
    /// Observation indices, ascending.
    pub indices: Vec<usize>,
    /// Speed-proxy feature values, aligned with `indices`.
    pub speeds: Vec<f64>,
    /// Heading-proxy feature values, aligned with `indices`.
    pub headings: Vec<f64>,
    /// Raw-signal traces of the configured channel, aligned with `indices`.
    /// Empty when no raw signal was supplied.
    pub traces: Vec<Vec<f64>>,
}

/// Partition the observations of one condition into `n_clusters` groups.
///
/// # Errors
///
/// Returns `DimensionMismatch` if the labels, features and raw signal do not
/// describe the same observations, and `InvalidInput` for a label outside
/// `[0, n_clusters)` or a column/channel out of range.
pub fn aggregate(
    labels: &[usize],
    features: &FeatureMatrix,
    raw: Option<&RawSignalArray>,
    n_clusters: usize,
    config: &KinematicConfig,
) -> Result<Vec<StateGroup>> {
    if labels.len() != features.n_rows() {
        return Err(Error::DimensionMismatch(format!(
            "{} labels for {} observations",
            labels.len(),
            features.n_rows()
        )));
    }
    if let Some(raw) = raw {
        if raw.n_observations() != features.n_rows() {
            return Err(Error::DimensionMismatch(format!(
                "raw signal has {} observations, feature matrix has {}",
                raw.n_observations(),
                features.n_rows()
            )));
        }
    }
    for column in [config.speed_column, config.heading_column] {
        if column >= features.n_cols() {
            return Err(Error::InvalidInput(format!(
                "feature column {column} out of range for {} features",
                features.n_cols()
            )));
        }
    }

    let mut groups = vec![StateGroup::default(); n_clusters];
    for (i, &label) in labels.iter().enumerate() {
        let group = groups.get_mut(label).ok_or_else(|| {
            Error::InvalidInput(format!(
                "label {label} of observation {i} outside [0, {n_clusters})"
            ))
        })?;
        let row = features.row(i);
        group.indices.push(i);
        group.speeds.push(row[config.speed_column]);
        group.headings.push(row[config.heading_column]);
        if let Some(raw) = raw {
            group.traces.push(raw.trace(i, config.signal_channel)?);
        }
    }
    Ok(groups)
}

/// Mean of `values`, NaN when empty.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Density-normalised histogram over fixed bin edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Bin edges, `bins + 1` values.
    pub edges: Vec<f64>,
    /// Bin midpoints.
    pub centers: Vec<f64>,
    /// Density per bin; integrates to 1 over the edges, NaN when no value
    /// falls inside them.
    pub density: Vec<f64>,
}

impl Histogram {
    /// Bin `values` into `edges`.
    ///
    /// Bins are half-open except the last, which includes its right edge.
    /// Values outside `[edges[0], edges[last]]` and NaN are ignored.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn density(values: &[f64], edges: &[f64]) -> Self {
        let n_bins = edges.len().saturating_sub(1);
        let mut counts = vec![0usize; n_bins];
        if n_bins > 0 {
            let (lo, hi) = (edges[0], edges[n_bins]);
            for &v in values {
                if !(lo..=hi).contains(&v) {
                    continue;
                }
                // first edge strictly greater than v, minus one
                let bin = edges.partition_point(|&e| e <= v).saturating_sub(1).min(n_bins - 1);
                counts[bin] += 1;
            }
        }
        let total: usize = counts.iter().sum();
        let density = counts
            .iter()
            .zip(edges.windows(2))
            .map(|(&c, w)| {
                if total == 0 {
                    f64::NAN
                } else {
                    c as f64 / (total as f64 * (w[1] - w[0]))
                }
            })
            .collect();
        let centers = edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        Self {
            edges: edges.to_vec(),
            centers,
            density,
        }
    }
}

/// Frame-wise mean of equal-length traces; `n_frames` NaNs when empty.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_trace<'a, I>(traces: I, n_frames: usize) -> Vec<f64>
where
    I: IntoIterator<Item = &'a Vec<f64>>,
{
    let mut sum = vec![0.0; n_frames];
    let mut count = 0usize;
    for trace in traces {
        for (s, v) in sum.iter_mut().zip(trace) {
            *s += v;
        }
        count += 1;
    }
    if count == 0 {
        return vec![f64::NAN; n_frames];
    }
    sum.into_iter().map(|s| s / count as f64).collect()
}

/// Per-state kinematic summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSummary {
    /// State (cluster) index.
    pub state: usize,
    /// Number of bouts assigned to the state.
    pub count: usize,
    /// Mean speed, NaN for an empty state.
    pub mean_speed: f64,
    /// Mean heading change, NaN for an empty state.
    pub mean_heading: f64,
    /// Speed density histogram.
    pub speed_histogram: Histogram,
    /// Heading-change density histogram.
    pub heading_histogram: Histogram,
    /// Mean trace over bouts whose trace mean is positive.
    pub positive_trace: Vec<f64>,
    /// Mean trace over bouts whose trace mean is negative.
    pub negative_trace: Vec<f64>,
    /// Mixture weight of this state in each condition.
    pub condition_weights: Vec<f64>,
}

/// Summarise groups produced by [`aggregate`].
///
/// `weights` is the model's `conditions x clusters` weight matrix. Bouts with
/// a zero trace mean belong to neither trace average.
#[must_use]
pub fn summarize(
    groups: &[StateGroup],
    weights: &Matrix,
    n_frames: usize,
    config: &KinematicConfig,
) -> Vec<StateSummary> {
    groups
        .iter()
        .enumerate()
        .map(|(state, group)| {
            let (positive, negative): (Vec<_>, Vec<_>) = group
                .traces
                .iter()
                .map(|t| (t, mean(t)))
                .filter(|(_, m)| *m != 0.0 && !m.is_nan())
                .partition(|(_, m)| *m > 0.0);
            StateSummary {
                state,
                count: group.indices.len(),
                mean_speed: mean(&group.speeds),
                mean_heading: mean(&group.headings),
                speed_histogram: Histogram::density(&group.speeds, &config.speed_bins),
                heading_histogram: Histogram::density(&group.headings, &config.heading_bins),
                positive_trace: mean_trace(positive.into_iter().map(|(t, _)| t), n_frames),
                negative_trace: mean_trace(negative.into_iter().map(|(t, _)| t), n_frames),
                condition_weights: if state < weights.n_cols() {
                    weights.column(state)
                } else {
                    Vec::new()
                },
            }
        })
        .collect()
}

/// Kinematic report for one condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinematicReport {
    /// Analysed condition.
    pub condition: usize,
    /// Bouts per state.
    pub occupancy: Vec<usize>,
    /// Per-state summaries, in state order.
    pub states: Vec<StateSummary>,
}

impl KinematicReport {
    /// Aggregate and summarise one condition's assignment.
    ///
    /// # Errors
    ///
    /// Propagates [`aggregate`] errors.
    pub fn build(
        condition: usize,
        assignment: &StateAssignment,
        features: &FeatureMatrix,
        raw: Option<&RawSignalArray>,
        weights: &Matrix,
        config: &KinematicConfig,
    ) -> Result<Self> {
        let groups = aggregate(
            assignment.labels(),
            features,
            raw,
            assignment.n_clusters(),
            config,
        )?;
        let n_frames = raw.map_or(0, RawSignalArray::n_frames);
        Ok(Self {
            condition,
            occupancy: assignment.occupancy(),
            states: summarize(&groups, weights, n_frames, config),
        })
    }
}
