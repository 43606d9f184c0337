//! Stochastic gradient descent trainer for the biased factor model.
//!
//! For each observed triple `(u, i, r)` with error `e = r - r̂(u, i)`:
//!
//! ```text
//! b_u += η (e - λ b_u)
//! b_i += η (e - λ b_i)
//! p_u += η (e q_i - λ p_u)
//! q_i += η (e p_u - λ q_i)
//! ```
//!
//! The factor updates read the pre-update values of both vectors. Biases start
//! at zero and factors are drawn from `N(0, init_std_dev²)`; an all-zero start
//! would leave the factor gradients at zero forever.

use crate::matrix::RatingMatrix;
use crate::model::FactorModel;
use bookrec_core::error::{RecError, RecResult};
use bookrec_core::types::{Hyperparameters, RatingScale};
use chrono::Utc;
use ndarray::{Array1, Array2, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

/// Largest absolute bias or factor value a converging run can plausibly hold.
/// Anything beyond it is treated as divergence even while still finite.
const MAX_PARAMETER_MAGNITUDE: f64 = 1.0e6;

#[derive(Debug, Clone, Copy)]
pub struct TrainerOptions {
    /// Seed for factor initialisation and epoch shuffling.
    pub seed: u64,
    pub shuffle_each_epoch: bool,
    pub init_std_dev: f64,
    pub rating_scale: RatingScale,
}

impl Default for TrainerOptions {
    fn default() -> Self {
        Self {
            seed: 42,
            shuffle_each_epoch: true,
            init_std_dev: 0.1,
            rating_scale: RatingScale::default(),
        }
    }
}

/// Trains a fresh model per call. Holds no state between runs, so one trainer
/// can be shared by any number of worker threads.
#[derive(Debug, Clone, Default)]
pub struct SgdTrainer {
    options: TrainerOptions,
}

impl SgdTrainer {
    pub fn new(options: TrainerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TrainerOptions {
        &self.options
    }

    /// Run `params.n_epochs` passes of SGD over `matrix`.
    ///
    /// Returns `TrainingDiverged` as soon as an epoch ends with a non-finite
    /// training error or a parameter outside `MAX_PARAMETER_MAGNITUDE`.
    pub fn train(&self, matrix: &RatingMatrix, params: &Hyperparameters) -> RecResult<FactorModel> {
        let n_users = matrix.n_users();
        let n_items = matrix.n_items();
        let n_factors = params.n_factors;
        let lr = params.learning_rate;
        let reg = params.regularization;

        let mut rng = StdRng::seed_from_u64(self.options.seed);
        let normal = Normal::new(0.0, self.options.init_std_dev).map_err(|e| {
            RecError::Config(format!(
                "invalid init_std_dev {}: {e}",
                self.options.init_std_dev
            ))
        })?;

        let global_mean = matrix.global_mean();
        let mut user_bias = Array1::<f64>::zeros(n_users);
        let mut item_bias = Array1::<f64>::zeros(n_items);
        let mut user_factors =
            Array2::from_shape_simple_fn((n_users, n_factors), || normal.sample(&mut rng));
        let mut item_factors =
            Array2::from_shape_simple_fn((n_items, n_factors), || normal.sample(&mut rng));

        let triples = matrix.triples();
        let mut order: Vec<usize> = (0..triples.len()).collect();

        for epoch in 0..params.n_epochs {
            if self.options.shuffle_each_epoch {
                order.shuffle(&mut rng);
            }

            let mut squared_error = 0.0;
            for &t in &order {
                let triple = triples[t];
                let (u, i) = (triple.user, triple.item);

                let mut p_u = user_factors.row_mut(u);
                let mut q_i = item_factors.row_mut(i);

                let estimate = global_mean + user_bias[u] + item_bias[i] + p_u.dot(&q_i);
                let err = triple.rating - estimate;
                squared_error += err * err;

                user_bias[u] += lr * (err - reg * user_bias[u]);
                item_bias[i] += lr * (err - reg * item_bias[i]);

                Zip::from(&mut p_u).and(&mut q_i).for_each(|p, q| {
                    let (p_old, q_old) = (*p, *q);
                    *p += lr * (err * q_old - reg * p_old);
                    *q += lr * (err * p_old - reg * q_old);
                });
            }

            let train_rmse = (squared_error / triples.len() as f64).sqrt();
            debug!(epoch = epoch + 1, train_rmse, "SGD epoch complete");

            if !train_rmse.is_finite() {
                return Err(RecError::TrainingDiverged(format!(
                    "training error became non-finite in epoch {} with {params}",
                    epoch + 1
                )));
            }
            let bounded = within_bounds(user_bias.iter())
                && within_bounds(item_bias.iter())
                && within_bounds(user_factors.iter())
                && within_bounds(item_factors.iter());
            if !bounded {
                return Err(RecError::TrainingDiverged(format!(
                    "parameters exceeded {MAX_PARAMETER_MAGNITUDE:e} in epoch {} with {params}",
                    epoch + 1
                )));
            }
        }

        Ok(FactorModel {
            global_mean,
            users: matrix.users().clone(),
            items: matrix.items().clone(),
            user_bias,
            item_bias,
            user_factors,
            item_factors,
            rating_scale: self.options.rating_scale,
            hyperparameters: *params,
            trained_at: Utc::now(),
        })
    }
}

fn within_bounds<'a>(mut values: impl Iterator<Item = &'a f64>) -> bool {
    values.all(|v| v.is_finite() && v.abs() <= MAX_PARAMETER_MAGNITUDE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookrec_core::types::RatingRecord;

    fn corpus() -> Vec<RatingRecord> {
        vec![
            RatingRecord::new("u1", "a", 8.0),
            RatingRecord::new("u1", "b", 5.0),
            RatingRecord::new("u2", "a", 9.0),
            RatingRecord::new("u2", "c", 7.0),
        ]
    }

    #[test]
    fn test_constant_corpus_converges_to_constant() {
        let mut records = Vec::new();
        for u in 0..5 {
            for i in 0..6 {
                if (u + i) % 2 == 0 {
                    records.push(RatingRecord::new(format!("u{u}"), format!("i{i}"), 6.0));
                }
            }
        }
        let matrix = RatingMatrix::build(&records).unwrap();
        let params = Hyperparameters {
            n_factors: 4,
            learning_rate: 0.01,
            regularization: 0.02,
            n_epochs: 200,
        };
        let model = SgdTrainer::default().train(&matrix, &params).unwrap();
        for t in matrix.triples() {
            let predicted = model.predict_raw(t.user, t.item);
            assert!(
                (predicted - 6.0).abs() < 0.05,
                "predicted {predicted} for ({}, {})",
                t.user,
                t.item
            );
        }
    }

    #[test]
    fn test_training_reduces_error() {
        let matrix = RatingMatrix::build(&corpus()).unwrap();
        let short = Hyperparameters {
            n_factors: 3,
            learning_rate: 0.01,
            regularization: 0.02,
            n_epochs: 1,
        };
        let long = Hyperparameters {
            n_epochs: 300,
            ..short
        };
        let rmse = |model: &FactorModel| {
            let se: f64 = matrix
                .triples()
                .iter()
                .map(|t| (t.rating - model.predict_raw(t.user, t.item)).powi(2))
                .sum();
            (se / matrix.n_ratings() as f64).sqrt()
        };
        let trainer = SgdTrainer::default();
        let before = rmse(&trainer.train(&matrix, &short).unwrap());
        let after = rmse(&trainer.train(&matrix, &long).unwrap());
        assert!(after < before, "rmse {after} not below {before}");
    }

    #[test]
    fn test_same_seed_same_model() {
        let matrix = RatingMatrix::build(&corpus()).unwrap();
        let params = Hyperparameters {
            n_factors: 5,
            n_epochs: 10,
            ..Hyperparameters::default()
        };
        let trainer = SgdTrainer::new(TrainerOptions {
            seed: 7,
            ..TrainerOptions::default()
        });
        let a = trainer.train(&matrix, &params).unwrap();
        let b = trainer.train(&matrix, &params).unwrap();
        assert_eq!(a.user_factors(), b.user_factors());
        assert_eq!(a.item_bias(), b.item_bias());
    }

    #[test]
    fn test_model_shapes_follow_matrix() {
        let matrix = RatingMatrix::build(&corpus()).unwrap();
        let params = Hyperparameters {
            n_factors: 6,
            n_epochs: 2,
            ..Hyperparameters::default()
        };
        let model = SgdTrainer::default().train(&matrix, &params).unwrap();
        assert_eq!(model.user_factors().dim(), (2, 6));
        assert_eq!(model.item_factors().dim(), (3, 6));
        assert_eq!(model.user_bias().len(), 2);
        assert_eq!(model.n_factors(), 6);
        assert!((model.global_mean() - 7.25).abs() < 1e-12);
    }

    #[test]
    fn test_huge_learning_rate_diverges() {
        let matrix = RatingMatrix::build(&corpus()).unwrap();
        let params = Hyperparameters {
            n_factors: 4,
            learning_rate: 1.0e6,
            regularization: 0.02,
            n_epochs: 50,
        };
        let err = SgdTrainer::default().train(&matrix, &params).unwrap_err();
        assert!(matches!(err, RecError::TrainingDiverged(_)));
    }

    #[test]
    fn test_unstable_learning_rates_never_return_exploded_model() {
        let matrix = RatingMatrix::build(&corpus()).unwrap();
        let mut diverged = 0;
        for &lr in &[0.05, 0.2, 0.5, 1.0, 1.0557, 2.0, 10.0, 100.0, 1.0e4] {
            for &n_epochs in &[5, 20, 50] {
                for seed in 0..5 {
                    let params = Hyperparameters {
                        n_factors: 4,
                        learning_rate: lr,
                        regularization: 0.02,
                        n_epochs,
                    };
                    let trainer = SgdTrainer::new(TrainerOptions {
                        seed,
                        ..TrainerOptions::default()
                    });
                    match trainer.train(&matrix, &params) {
                        Ok(model) => {
                            for u in 0..matrix.n_users() {
                                for i in 0..matrix.n_items() {
                                    let p = model.predict_raw(u, i);
                                    assert!(
                                        p.is_finite() && p.abs() < 1.0e100,
                                        "lr={lr} epochs={n_epochs} seed={seed}: {p}"
                                    );
                                }
                            }
                        }
                        Err(RecError::TrainingDiverged(_)) => diverged += 1,
                        Err(other) => panic!("unexpected error: {other:?}"),
                    }
                }
            }
        }
        assert!(diverged > 0);
    }
}
