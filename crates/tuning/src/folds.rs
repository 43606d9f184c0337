//! K-fold partitioning of the rating corpus.

use bookrec_core::error::{RecError, RecResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Train/test row indices for one fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// K-Fold splitter.
///
/// Test folds are disjoint, cover every row exactly once, and differ in size
/// by at most one (the first `n % k` folds take the extra row).
#[derive(Debug, Clone)]
pub struct KFold {
    n_splits: usize,
    shuffle: bool,
    random_state: Option<u64>,
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: false,
            random_state: None,
        }
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Seeded shuffling; implies `with_shuffle(true)`.
    pub fn with_random_state(mut self, random_state: u64) -> Self {
        self.random_state = Some(random_state);
        self.shuffle = true;
        self
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    pub fn split(&self, n_samples: usize) -> RecResult<Vec<Fold>> {
        if self.n_splits < 2 {
            return Err(RecError::Config(format!(
                "fold count must be at least 2, got {}",
                self.n_splits
            )));
        }
        if n_samples < self.n_splits {
            return Err(RecError::InvalidInput(format!(
                "cannot split {n_samples} ratings into {} folds",
                self.n_splits
            )));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if self.shuffle {
            match self.random_state {
                Some(seed) => indices.shuffle(&mut StdRng::seed_from_u64(seed)),
                None => indices.shuffle(&mut rand::thread_rng()),
            }
        }

        let fold_size = n_samples / self.n_splits;
        let remainder = n_samples % self.n_splits;

        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for i in 0..self.n_splits {
            let size = if i < remainder { fold_size + 1 } else { fold_size };
            let end = start + size;

            let test = indices[start..end].to_vec();
            let mut train = Vec::with_capacity(n_samples - size);
            train.extend_from_slice(&indices[..start]);
            train.extend_from_slice(&indices[end..]);

            folds.push(Fold { train, test });
            start = end;
        }

        Ok(folds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kfold_covers_every_row_once() {
        let folds = KFold::new(3).split(10).unwrap();
        assert_eq!(folds.len(), 3);

        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.test.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());

        for fold in &folds {
            assert_eq!(fold.train.len() + fold.test.len(), 10);
            assert!(fold.test.iter().all(|t| !fold.train.contains(t)));
        }
    }

    #[test]
    fn test_kfold_uneven_sizes() {
        let sizes: Vec<usize> = KFold::new(4)
            .split(10)
            .unwrap()
            .iter()
            .map(|f| f.test.len())
            .collect();
        assert_eq!(sizes, vec![3, 3, 2, 2]);
    }

    #[test]
    fn test_kfold_no_shuffle_is_contiguous() {
        let folds = KFold::new(2).split(4).unwrap();
        assert_eq!(folds[0].test, vec![0, 1]);
        assert_eq!(folds[1].test, vec![2, 3]);
    }

    #[test]
    fn test_kfold_seeded_shuffle_reproducible() {
        let a = KFold::new(5).with_random_state(11).split(50).unwrap();
        let b = KFold::new(5).with_random_state(11).split(50).unwrap();
        let c = KFold::new(5).with_random_state(12).split(50).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_kfold_rejects_too_few_rows() {
        let err = KFold::new(5).split(3).unwrap_err();
        assert!(matches!(err, RecError::InvalidInput(_)));
        assert!(KFold::new(1).split(3).is_err());
    }
}
