//! Accuracy metrics for rating prediction.

use bookrec_core::types::Hyperparameters;
use serde::Serialize;

/// Root-mean-squared error. Returns 0.0 for empty input.
pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    debug_assert_eq!(actual.len(), predicted.len());
    if actual.is_empty() {
        return 0.0;
    }
    let sum: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    (sum / actual.len() as f64).sqrt()
}

/// Mean absolute error. Returns 0.0 for empty input.
pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    debug_assert_eq!(actual.len(), predicted.len());
    if actual.is_empty() {
        return 0.0;
    }
    let sum: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).abs()).sum();
    sum / actual.len() as f64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoldMetrics {
    pub fold: usize,
    pub rmse: f64,
    pub mae: f64,
    pub train_size: usize,
    pub test_size: usize,
}

/// Per-fold scores of one configuration plus aggregates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossValidationResult {
    pub params: Hyperparameters,
    pub folds: Vec<FoldMetrics>,
}

impl CrossValidationResult {
    /// Aggregate score used for model selection.
    pub fn mean_rmse(&self) -> f64 {
        mean(self.folds.iter().map(|f| f.rmse))
    }

    pub fn mean_mae(&self) -> f64 {
        mean(self.folds.iter().map(|f| f.mae))
    }

    /// Population standard deviation of fold RMSE.
    pub fn std_rmse(&self) -> f64 {
        let m = self.mean_rmse();
        mean(self.folds.iter().map(|f| (f.rmse - m).powi(2))).sqrt()
    }

    pub fn min_rmse(&self) -> f64 {
        self.folds.iter().map(|f| f.rmse).fold(f64::INFINITY, f64::min)
    }

    pub fn max_rmse(&self) -> f64 {
        self.folds
            .iter()
            .map(|f| f.rmse)
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
