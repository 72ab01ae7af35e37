//! Train / held-out splitting of one condition's observations.
//!
//! Training indices are drawn from `[0, N)` by the configured [`Sampling`]
//! policy. The held-out set is every index not drawn, in ascending order,
//! truncated to the first `N - train_size` entries. Without replacement the
//! complement has exactly that length; with replacement duplicates leave a
//! larger complement and the ascending prefix is kept.

use crate::config::Sampling;
use crate::{Error, Result};
use rand::seq::index;
use rand::Rng;

/// Index sets of one split. Training indices keep draw order and duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    train: Vec<usize>,
    held_out: Vec<usize>,
}

impl Split {
    /// Training indices, in draw order.
    #[must_use]
    pub fn train(&self) -> &[usize] {
        &self.train
    }

    /// Held-out indices, ascending.
    #[must_use]
    pub fn held_out(&self) -> &[usize] {
        &self.held_out
    }

    /// Shorten the held-out set to its first `len` indices.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSize` if fewer than `len` held-out indices exist.
    pub fn truncate_held_out(&mut self, len: usize) -> Result<()> {
        if len > self.held_out.len() {
            return Err(Error::invalid_size(
                "held-out truncation",
                len,
                self.held_out.len(),
            ));
        }
        self.held_out.truncate(len);
        Ok(())
    }

    /// Consume into `(train, held_out)`.
    #[must_use]
    pub fn into_parts(self) -> (Vec<usize>, Vec<usize>) {
        (self.train, self.held_out)
    }
}

/// Draw `train_size` training indices from `[0, n)`.
///
/// # Errors
///
/// Returns `InvalidSize` if `train_size > n`.
pub fn draw_train<R: Rng + ?Sized>(
    n: usize,
    train_size: usize,
    sampling: Sampling,
    rng: &mut R,
) -> Result<Vec<usize>> {
    if train_size > n {
        return Err(Error::invalid_size("training split", train_size, n));
    }
    Ok(match sampling {
        Sampling::WithoutReplacement => index::sample(rng, n, train_size).into_vec(),
        Sampling::WithReplacement => (0..train_size).map(|_| rng.gen_range(0..n)).collect(),
    })
}

/// Split the observations `[0, n)` of one condition.
///
/// # Errors
///
/// Returns `InvalidSize` if `train_size > n`.
pub fn split<R: Rng + ?Sized>(
    n: usize,
    train_size: usize,
    sampling: Sampling,
    rng: &mut R,
) -> Result<Split> {
    let train = draw_train(n, train_size, sampling, rng)?;

    let mut drawn = vec![false; n];
    for &i in &train {
        drawn[i] = true;
    }
    let held_out = (0..n)
        .filter(|&i| !drawn[i])
        .take(n - train_size)
        .collect();

    Ok(Split { train, held_out })
}

/// Split every condition with the same training size and truncate all
/// held-out sets to a common length, `min(n_c) - train_size`.
///
/// Conditions are split in order, drawing from the same random source.
///
/// # Errors
///
/// Returns `InvalidSize` naming the first condition with fewer than
/// `train_size` observations.
pub fn split_conditions<R: Rng + ?Sized>(
    sizes: &[usize],
    train_size: usize,
    sampling: Sampling,
    rng: &mut R,
) -> Result<Vec<Split>> {
    for (c, &n) in sizes.iter().enumerate() {
        if train_size > n {
            return Err(Error::invalid_size(
                format!("training split of condition {c}"),
                train_size,
                n,
            ));
        }
    }
    let common = sizes.iter().min().map_or(0, |&n| n - train_size);

    sizes
        .iter()
        .map(|&n| {
            let mut s = split(n, train_size, sampling, rng)?;
            s.truncate_held_out(common)?;
            Ok(s)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_split_without_replacement_is_disjoint() {
        let mut rng = StdRng::seed_from_u64(1);
        let s = split(100, 60, Sampling::WithoutReplacement, &mut rng).unwrap();
        assert_eq!(s.train().len(), 60);
        assert_eq!(s.held_out().len(), 40);
        let train: HashSet<_> = s.train().iter().collect();
        assert_eq!(train.len(), 60);
        assert!(s.held_out().iter().all(|i| !train.contains(i)));
    }

    #[test]
    fn test_split_with_replacement_prefix() {
        let mut rng = StdRng::seed_from_u64(3);
        let s = split(50, 40, Sampling::WithReplacement, &mut rng).unwrap();
        assert_eq!(s.train().len(), 40);
        // complement of unique draws is at least n - train_size
        assert_eq!(s.held_out().len(), 10);
        assert!(s.held_out().windows(2).all(|w| w[0] < w[1]));
        assert!(s.held_out().iter().all(|i| !s.train().contains(i)));
    }

    #[test]
    fn test_split_too_large() {
        let mut rng = StdRng::seed_from_u64(0);
        let result = split(10, 11, Sampling::WithoutReplacement, &mut rng);
        assert!(matches!(
            result,
            Err(Error::InvalidSize {
                requested: 11,
                available: 10,
                ..
            })
        ));
    }

    #[test]
    fn test_full_train_leaves_nothing_held_out() {
        let mut rng = StdRng::seed_from_u64(0);
        let s = split(10, 10, Sampling::WithoutReplacement, &mut rng).unwrap();
        assert!(s.held_out().is_empty());
    }

    #[test]
    fn test_split_conditions_common_held_out_length() {
        let mut rng = StdRng::seed_from_u64(9);
        let splits =
            split_conditions(&[100, 80, 120], 50, Sampling::WithoutReplacement, &mut rng).unwrap();
        assert_eq!(splits.len(), 3);
        for s in &splits {
            assert_eq!(s.train().len(), 50);
            assert_eq!(s.held_out().len(), 30);
        }
    }

    #[test]
    fn test_split_conditions_names_condition() {
        let mut rng = StdRng::seed_from_u64(9);
        let err = split_conditions(&[100, 20], 50, Sampling::WithoutReplacement, &mut rng)
            .unwrap_err();
        assert!(err.to_string().contains("condition 1"));
    }
}
