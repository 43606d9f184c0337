//! Grid search over hyperparameter configurations.
//!
//! Every (configuration, fold) pair is an independent training task with its
//! own model, so the whole grid runs as one parallel map followed by a
//! per-configuration reduce. A configuration whose fold fails (for example by
//! diverging) is recorded as failed and excluded from selection; the rest of
//! the grid is unaffected.

use crate::cv::{evaluate_fold, prepare_folds, run_in_pool, CvOptions};
use crate::metrics::{CrossValidationResult, FoldMetrics};
use bookrec_core::error::{RecError, RecResult};
use bookrec_core::types::{Hyperparameters, RatingRecord};
use bookrec_factorization::SgdTrainer;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigStatus {
    Evaluated(CrossValidationResult),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigOutcome {
    /// Position in the grid.
    pub index: usize,
    pub params: Hyperparameters,
    pub status: ConfigStatus,
}

impl ConfigOutcome {
    pub fn result(&self) -> Option<&CrossValidationResult> {
        match &self.status {
            ConfigStatus::Evaluated(result) => Some(result),
            ConfigStatus::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, ConfigStatus::Failed(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GridSearchResult {
    pub outcomes: Vec<ConfigOutcome>,
    pub best_index: usize,
}

impl GridSearchResult {
    pub fn best(&self) -> &ConfigOutcome {
        &self.outcomes[self.best_index]
    }

    pub fn best_params(&self) -> Hyperparameters {
        self.best().params
    }

    /// Metrics of the selected configuration. Selection only ever picks an
    /// evaluated configuration.
    pub fn best_result(&self) -> Option<&CrossValidationResult> {
        self.best().result()
    }

    pub fn n_failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }
}

pub struct GridSearch {
    options: CvOptions,
}

impl GridSearch {
    pub fn new(options: CvOptions) -> Self {
        Self { options }
    }

    pub fn run(
        &self,
        records: &[RatingRecord],
        grid: &[Hyperparameters],
    ) -> RecResult<GridSearchResult> {
        if grid.is_empty() {
            return Err(RecError::Config("hyperparameter grid is empty".into()));
        }

        // Fold matrices are built once and shared by every configuration.
        let folds = prepare_folds(records, &self.options)?;
        let trainer = SgdTrainer::new(self.options.trainer);
        let n_folds = folds.len();

        let tasks: Vec<(usize, usize)> = (0..grid.len())
            .flat_map(|c| (0..n_folds).map(move |f| (c, f)))
            .collect();

        info!(
            configurations = grid.len(),
            folds = n_folds,
            tasks = tasks.len(),
            "Starting grid search"
        );

        let scored: Vec<RecResult<FoldMetrics>> = run_in_pool(self.options.parallelism, || {
            tasks
                .par_iter()
                .map(|&(c, f)| evaluate_fold(&folds[f], &grid[c], &trainer))
                .collect()
        })?;

        let mut scored = scored.into_iter();
        let mut outcomes = Vec::with_capacity(grid.len());
        for (index, params) in grid.iter().enumerate() {
            // Drain the whole chunk first; collecting straight into a Result
            // would stop at the first error and misalign the next chunk.
            let chunk: Vec<RecResult<FoldMetrics>> = scored.by_ref().take(n_folds).collect();
            let per_fold: RecResult<Vec<FoldMetrics>> = chunk.into_iter().collect();
            let status = match per_fold {
                Ok(folds) => {
                    let result = CrossValidationResult {
                        params: *params,
                        folds,
                    };
                    info!(
                        index,
                        params = %params,
                        mean_rmse = result.mean_rmse(),
                        mean_mae = result.mean_mae(),
                        "Configuration evaluated"
                    );
                    ConfigStatus::Evaluated(result)
                }
                Err(e) => {
                    warn!(index, params = %params, error = %e, "Configuration failed");
                    ConfigStatus::Failed(e.to_string())
                }
            };
            outcomes.push(ConfigOutcome {
                index,
                params: *params,
                status,
            });
        }

        let best_index = select_best(&outcomes).ok_or_else(|| {
            RecError::TrainingDiverged(format!(
                "all {} configurations failed",
                outcomes.len()
            ))
        })?;

        Ok(GridSearchResult {
            outcomes,
            best_index,
        })
    }
}

/// Lowest mean RMSE wins; ties go to lower mean MAE, then to the earlier
/// grid position.
pub(crate) fn select_best(outcomes: &[ConfigOutcome]) -> Option<usize> {
    outcomes
        .iter()
        .filter_map(|o| o.result().map(|r| (o.index, r.mean_rmse(), r.mean_mae())))
        .min_by(|a, b| {
            a.1.total_cmp(&b.1)
                .then(a.2.total_cmp(&b.2))
                .then(a.0.cmp(&b.0))
        })
        .map(|(index, _, _)| index)
}
