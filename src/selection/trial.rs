//! Trial Record - one (cluster count, repetition) held-out scoring run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    /// Fit and scoring succeeded.
    Success,
    /// The fit or the scoring failed; the error is kept on the record.
    Failed,
}

/// Key of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrialId {
    /// Number of mixture components fitted.
    pub cluster_count: usize,
    /// Repetition index within the cluster count.
    pub repetition: usize,
}

impl TrialId {
    /// Create a trial key.
    #[must_use]
    pub const fn new(cluster_count: usize, repetition: usize) -> Self {
        Self {
            cluster_count,
            repetition,
        }
    }

    /// Seed of this trial's random source, mixed from the run seed so that
    /// every trial is reproducible on its own.
    #[must_use]
    pub const fn seed(&self, run_seed: u64) -> u64 {
        splitmix64(
            run_seed
                ^ splitmix64(self.cluster_count as u64)
                ^ splitmix64(self.repetition as u64).rotate_left(32),
        )
    }
}

const fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Immutable record of one finished trial.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrialRecord {
    id: TrialId,
    status: TrialStatus,
    held_out_log_likelihood: Option<f64>,
    error: Option<String>,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
}

impl TrialRecord {
    /// Record a successful trial.
    #[must_use]
    pub const fn success(
        id: TrialId,
        held_out_log_likelihood: f64,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status: TrialStatus::Success,
            held_out_log_likelihood: Some(held_out_log_likelihood),
            error: None,
            started_at,
            ended_at,
        }
    }

    /// Record a failed trial.
    #[must_use]
    pub fn failure(
        id: TrialId,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status: TrialStatus::Failed,
            held_out_log_likelihood: None,
            error: Some(error.into()),
            started_at,
            ended_at,
        }
    }

    /// Trial key.
    #[must_use]
    pub const fn id(&self) -> TrialId {
        self.id
    }

    /// Trial status.
    #[must_use]
    pub const fn status(&self) -> TrialStatus {
        self.status
    }

    /// Held-out log-likelihood of a successful trial.
    #[must_use]
    pub const fn held_out_log_likelihood(&self) -> Option<f64> {
        self.held_out_log_likelihood
    }

    /// Error message of a failed trial.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// When the trial started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the trial finished.
    #[must_use]
    pub const fn ended_at(&self) -> DateTime<Utc> {
        self.ended_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trial_seed_distinct_per_trial() {
        let a = TrialId::new(3, 0).seed(42);
        let b = TrialId::new(3, 1).seed(42);
        let c = TrialId::new(4, 0).seed(42);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, TrialId::new(3, 0).seed(42));
        assert_ne!(a, TrialId::new(3, 0).seed(43));
    }

    #[test]
    fn test_failure_record() {
        let now = Utc::now();
        let r = TrialRecord::failure(TrialId::new(5, 2), "no convergence", now, now);
        assert_eq!(r.status(), TrialStatus::Failed);
        assert!(r.held_out_log_likelihood().is_none());
        assert_eq!(r.error(), Some("no convergence"));
        assert_eq!(r.id().repetition, 2);
    }
}
