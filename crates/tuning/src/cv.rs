//! K-fold cross-validation of a single hyperparameter configuration.
//!
//! Each fold trains a private model on its training rows and scores it on the
//! held-out rows. Users or items that only occur in the held-out rows go
//! through the model's cold-start fallback. Fold models are discarded after
//! scoring.

use crate::folds::KFold;
use crate::metrics::{mae, rmse, CrossValidationResult, FoldMetrics};
use bookrec_core::config::TrainingConfig;
use bookrec_core::error::{RecError, RecResult};
use bookrec_core::types::{Hyperparameters, RatingRecord};
use bookrec_factorization::{RatingMatrix, SgdTrainer, TrainerOptions};
use rayon::prelude::*;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
pub struct CvOptions {
    pub fold_count: usize,
    /// Seed for the fold partition. The same partition is used for every
    /// configuration in a search.
    pub seed: u64,
    pub trainer: TrainerOptions,
    /// Worker threads; 0 uses the global rayon pool.
    pub parallelism: usize,
}

impl Default for CvOptions {
    fn default() -> Self {
        Self {
            fold_count: 5,
            seed: 42,
            trainer: TrainerOptions::default(),
            parallelism: 0,
        }
    }
}

impl From<&TrainingConfig> for CvOptions {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            fold_count: config.fold_count,
            seed: config.seed,
            trainer: TrainerOptions {
                seed: config.seed,
                shuffle_each_epoch: config.shuffle_each_epoch,
                init_std_dev: config.init_std_dev,
                rating_scale: config.rating_scale,
            },
            parallelism: config.parallelism,
        }
    }
}

/// A fold with its training matrix already built.
pub(crate) struct PreparedFold<'a> {
    pub index: usize,
    pub train: RatingMatrix,
    pub test: Vec<&'a RatingRecord>,
}

pub(crate) fn prepare_folds<'a>(
    records: &'a [RatingRecord],
    options: &CvOptions,
) -> RecResult<Vec<PreparedFold<'a>>> {
    let folds = KFold::new(options.fold_count)
        .with_random_state(options.seed)
        .split(records.len())?;

    folds
        .into_iter()
        .enumerate()
        .map(|(index, fold)| {
            let train = RatingMatrix::build(fold.train.iter().map(|&r| &records[r]))?;
            let test = fold.test.iter().map(|&r| &records[r]).collect();
            Ok(PreparedFold { index, train, test })
        })
        .collect()
}

pub(crate) fn evaluate_fold(
    fold: &PreparedFold<'_>,
    params: &Hyperparameters,
    trainer: &SgdTrainer,
) -> RecResult<FoldMetrics> {
    let model = trainer.train(&fold.train, params)?;

    let actual: Vec<f64> = fold.test.iter().map(|r| r.rating).collect();
    let predicted: Vec<f64> = fold
        .test
        .iter()
        .map(|r| model.estimate_clipped(&r.user_id, &r.item_id))
        .collect();

    let metrics = FoldMetrics {
        fold: fold.index,
        rmse: rmse(&actual, &predicted),
        mae: mae(&actual, &predicted),
        train_size: fold.train.n_ratings(),
        test_size: fold.test.len(),
    };
    debug!(
        fold = metrics.fold,
        rmse = metrics.rmse,
        mae = metrics.mae,
        params = %params,
        "Fold evaluated"
    );
    Ok(metrics)
}

/// Run `op` on a dedicated pool of `threads` workers, or the global pool for 0.
pub(crate) fn run_in_pool<T, F>(threads: usize, op: F) -> RecResult<T>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    if threads == 0 {
        return Ok(op());
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("bookrec-cv-{i}"))
        .build()
        .map_err(|e| RecError::Config(format!("failed to build worker pool: {e}")))?;
    Ok(pool.install(op))
}

/// Cross-validate one configuration, folds in parallel.
pub fn cross_validate(
    records: &[RatingRecord],
    params: &Hyperparameters,
    options: &CvOptions,
) -> RecResult<CrossValidationResult> {
    let folds = prepare_folds(records, options)?;
    let trainer = SgdTrainer::new(options.trainer);

    let scored: RecResult<Vec<FoldMetrics>> = run_in_pool(options.parallelism, || {
        folds
            .par_iter()
            .map(|fold| evaluate_fold(fold, params, &trainer))
            .collect()
    })?;

    let result = CrossValidationResult {
        params: *params,
        folds: scored?,
    };
    info!(
        params = %params,
        mean_rmse = result.mean_rmse(),
        mean_mae = result.mean_mae(),
        std_rmse = result.std_rmse(),
        "Cross-validation complete"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<RatingRecord> {
        let mut records = Vec::new();
        for u in 0..8 {
            for i in 0..10 {
                if (u * 3 + i) % 4 != 0 {
                    let rating = 1.0 + ((u + 2 * i) % 10) as f64;
                    records.push(RatingRecord::new(format!("u{u}"), format!("b{i}"), rating));
                }
            }
        }
        records
    }

    fn small_params() -> Hyperparameters {
        Hyperparameters {
            n_factors: 4,
            learning_rate: 0.01,
            regularization: 0.05,
            n_epochs: 15,
        }
    }

    #[test]
    fn test_cross_validate_fold_accounting() {
        let records = corpus();
        let options = CvOptions {
            fold_count: 3,
            ..CvOptions::default()
        };
        let result = cross_validate(&records, &small_params(), &options).unwrap();
        assert_eq!(result.folds.len(), 3);
        let tested: usize = result.folds.iter().map(|f| f.test_size).sum();
        assert_eq!(tested, records.len());
        for fold in &result.folds {
            assert_eq!(fold.train_size + fold.test_size, records.len());
            assert!(fold.rmse.is_finite() && fold.rmse >= fold.mae);
        }
    }

    #[test]
    fn test_cross_validate_reproducible() {
        let records = corpus();
        let options = CvOptions {
            fold_count: 4,
            seed: 9,
            ..CvOptions::default()
        };
        let a = cross_validate(&records, &small_params(), &options).unwrap();
        let b = cross_validate(&records, &small_params(), &options).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dedicated_pool_matches_global_pool() {
        let records = corpus();
        let global = CvOptions {
            fold_count: 3,
            ..CvOptions::default()
        };
        let pooled = CvOptions {
            parallelism: 2,
            ..global
        };
        let a = cross_validate(&records, &small_params(), &global).unwrap();
        let b = cross_validate(&records, &small_params(), &pooled).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_too_few_ratings_is_invalid_input() {
        let records = vec![RatingRecord::new("u1", "a", 5.0)];
        let err = cross_validate(&records, &small_params(), &CvOptions::default()).unwrap_err();
        assert!(matches!(err, RecError::InvalidInput(_)));
    }
}
