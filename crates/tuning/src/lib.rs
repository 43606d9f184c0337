//! Model selection: k-fold cross-validation, RMSE/MAE scoring, parallel grid
//! search over hyperparameters, and the end-to-end training pipeline.

pub mod cv;
pub mod folds;
pub mod metrics;
pub mod pipeline;
pub mod search;

pub use cv::{cross_validate, CvOptions};
pub use folds::{Fold, KFold};
pub use metrics::{mae, rmse, CrossValidationResult, FoldMetrics};
pub use pipeline::{train_pipeline, TrainingOutcome, TrainingRequest};
pub use search::{ConfigOutcome, ConfigStatus, GridSearch, GridSearchResult};
