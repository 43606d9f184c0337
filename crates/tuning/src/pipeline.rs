//! Training entry point: rating table in, selected configuration, its
//! cross-validated metrics and a serving model out.

use crate::cv::CvOptions;
use crate::metrics::CrossValidationResult;
use crate::search::{GridSearch, GridSearchResult};
use bookrec_core::config::TrainingConfig;
use bookrec_core::error::{RecError, RecResult};
use bookrec_core::types::{Hyperparameters, RatingRecord, RatingScale};
use bookrec_factorization::{FactorModel, ModelStore, RatingMatrix, SgdTrainer, TrainerOptions};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone)]
pub struct TrainingRequest {
    pub rating_scale: RatingScale,
    pub grid: Vec<Hyperparameters>,
    pub fold_count: usize,
    pub seed: u64,
    pub shuffle_each_epoch: bool,
    pub init_std_dev: f64,
    pub parallelism: usize,
}

impl From<&TrainingConfig> for TrainingRequest {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            rating_scale: config.rating_scale,
            grid: config.grid.expand(),
            fold_count: config.fold_count,
            seed: config.seed,
            shuffle_each_epoch: config.shuffle_each_epoch,
            init_std_dev: config.init_std_dev,
            parallelism: config.parallelism,
        }
    }
}

impl TrainingRequest {
    pub fn trainer_options(&self) -> TrainerOptions {
        TrainerOptions {
            seed: self.seed,
            shuffle_each_epoch: self.shuffle_each_epoch,
            init_std_dev: self.init_std_dev,
            rating_scale: self.rating_scale,
        }
    }

    pub fn cv_options(&self) -> CvOptions {
        CvOptions {
            fold_count: self.fold_count,
            seed: self.seed,
            trainer: self.trainer_options(),
            parallelism: self.parallelism,
        }
    }

    fn validate(&self) -> RecResult<()> {
        if !self.rating_scale.is_valid() {
            return Err(RecError::Config("rating scale must satisfy min < max".into()));
        }
        if self.fold_count < 2 {
            return Err(RecError::Config(format!(
                "fold count must be at least 2, got {}",
                self.fold_count
            )));
        }
        if self.grid.is_empty() {
            return Err(RecError::Config("hyperparameter grid is empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct TrainingOutcome {
    pub best_config: Hyperparameters,
    /// Cross-validated metrics of `best_config`.
    pub metrics: CrossValidationResult,
    pub search: GridSearchResult,
    /// Retrained on the full corpus with `best_config`.
    pub model: FactorModel,
}

impl TrainingOutcome {
    pub fn save_model<P: AsRef<Path>>(&self, path: P) -> RecResult<()> {
        ModelStore::save(&self.model, path)
    }
}

/// Search the grid with k-fold cross-validation, then retrain the winner on
/// every rating. Input problems surface before any training starts.
pub fn train_pipeline(
    records: &[RatingRecord],
    request: &TrainingRequest,
) -> RecResult<TrainingOutcome> {
    request.validate()?;

    if let Some((row, record)) = records
        .iter()
        .enumerate()
        .find(|(_, r)| !request.rating_scale.contains(r.rating))
    {
        return Err(RecError::InvalidInput(format!(
            "record {row}: rating {} outside scale [{}, {}]",
            record.rating, request.rating_scale.min, request.rating_scale.max
        )));
    }

    let full = RatingMatrix::build(records)?;
    info!(
        users = full.n_users(),
        items = full.n_items(),
        ratings = full.n_ratings(),
        global_mean = full.global_mean(),
        "Rating matrix built"
    );

    let search = GridSearch::new(request.cv_options()).run(records, &request.grid)?;
    let best_config = search.best_params();
    let metrics = search
        .best_result()
        .cloned()
        .ok_or_else(|| RecError::TrainingDiverged("no configuration was evaluated".into()))?;

    info!(
        best = %best_config,
        mean_rmse = metrics.mean_rmse(),
        mean_mae = metrics.mean_mae(),
        failed = search.n_failed(),
        "Best configuration selected"
    );

    let model = SgdTrainer::new(request.trainer_options()).train(&full, &best_config)?;
    info!(best = %best_config, "Final model trained on full corpus");

    Ok(TrainingOutcome {
        best_config,
        metrics,
        search,
        model,
    })
}
