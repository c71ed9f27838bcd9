//! Seeded train/test partitioning.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use thiserror::Error;

/// Smallest accepted test fraction.
pub const MIN_TEST_FRACTION: f64 = 0.05;
/// Largest accepted test fraction.
pub const MAX_TEST_FRACTION: f64 = 0.5;

#[derive(Debug, Error, PartialEq)]
pub enum SplitError {
    #[error("test_size must be within [{min}, {max}], got {0}", min = MIN_TEST_FRACTION, max = MAX_TEST_FRACTION)]
    InvalidFraction(f64),
    #[error("{rows} rows cannot be split into non-empty train and test partitions")]
    InsufficientRows { rows: usize },
}

/// Row indices for each partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..rows` with `seed` and cut off `ceil(test_fraction * rows)` test rows.
///
/// The same inputs always produce the same partitions.
pub fn train_test_split(
    rows: usize,
    test_fraction: f64,
    seed: u64,
) -> Result<TrainTestSplit, SplitError> {
    if !test_fraction.is_finite()
        || !(MIN_TEST_FRACTION..=MAX_TEST_FRACTION).contains(&test_fraction)
    {
        return Err(SplitError::InvalidFraction(test_fraction));
    }
    let n_test = (test_fraction * rows as f64).ceil() as usize;
    if n_test == 0 || n_test >= rows {
        return Err(SplitError::InsufficientRows { rows });
    }

    let mut indices: Vec<usize> = (0..rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let train = indices.split_off(n_test);
    Ok(TrainTestSplit {
        train,
        test: indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_is_reproducible_and_disjoint() {
        let a = train_test_split(100, 0.2, 42).unwrap();
        let b = train_test_split(100, 0.2, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.test.len(), 20);
        assert_eq!(a.train.len(), 80);
        let mut all: Vec<usize> = a.train.iter().chain(a.test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn different_seed_changes_partition() {
        let a = train_test_split(100, 0.2, 1).unwrap();
        let b = train_test_split(100, 0.2, 2).unwrap();
        assert_ne!(a.test, b.test);
    }

    #[test]
    fn bounds_keep_both_partitions_non_empty() {
        for fraction in [MIN_TEST_FRACTION, MAX_TEST_FRACTION] {
            let split = train_test_split(3, fraction, 42).unwrap();
            assert!(!split.train.is_empty());
            assert!(!split.test.is_empty());
        }
    }

    #[test]
    fn rejects_out_of_range_fraction() {
        assert_eq!(
            train_test_split(100, 0.6, 42),
            Err(SplitError::InvalidFraction(0.6))
        );
        assert!(train_test_split(100, f64::NAN, 42).is_err());
        assert!(train_test_split(100, 0.0, 42).is_err());
    }

    #[test]
    fn rejects_tiny_datasets() {
        assert_eq!(
            train_test_split(1, 0.5, 42),
            Err(SplitError::InsufficientRows { rows: 1 })
        );
        assert!(train_test_split(0, 0.2, 42).is_err());
    }
}
