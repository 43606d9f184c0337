use crate::error::{RecError, RecResult};
use crate::types::{Hyperparameters, ParamGrid, RatingScale};
use serde::Deserialize;
use std::path::Path;

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `BOOKREC__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub recommend: RecommendConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Location and column layout of the cleaned rating table.
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_ratings_path")]
    pub ratings_path: String,
    #[serde(default = "default_user_column")]
    pub user_column: String,
    #[serde(default = "default_item_column")]
    pub item_column: String,
    #[serde(default = "default_rating_column")]
    pub rating_column: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    #[serde(default)]
    pub rating_scale: RatingScale,
    #[serde(default)]
    pub grid: ParamGrid,
    #[serde(default = "default_fold_count")]
    pub fold_count: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_shuffle_each_epoch")]
    pub shuffle_each_epoch: bool,
    #[serde(default = "default_init_std_dev")]
    pub init_std_dev: f64,
    /// Worker threads for grid search. 0 uses every core.
    #[serde(default)]
    pub parallelism: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_artifact_path")]
    pub artifact_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_round_decimals")]
    pub round_decimals: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default functions
fn default_ratings_path() -> String {
    "data/cleaned_ratings.csv".to_string()
}
fn default_user_column() -> String {
    "User-ID".to_string()
}
fn default_item_column() -> String {
    "Book-Title".to_string()
}
fn default_rating_column() -> String {
    "Book-Rating".to_string()
}
fn default_fold_count() -> usize {
    5
}
fn default_seed() -> u64 {
    42
}
fn default_shuffle_each_epoch() -> bool {
    true
}
fn default_init_std_dev() -> f64 {
    0.1
}
fn default_artifact_path() -> String {
    "model/bookrec-model.json".to_string()
}
fn default_top_k() -> usize {
    10
}
fn default_round_decimals() -> u32 {
    2
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            ratings_path: default_ratings_path(),
            user_column: default_user_column(),
            item_column: default_item_column(),
            rating_column: default_rating_column(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            rating_scale: RatingScale::default(),
            grid: ParamGrid::default(),
            fold_count: default_fold_count(),
            seed: default_seed(),
            shuffle_each_epoch: default_shuffle_each_epoch(),
            init_std_dev: default_init_std_dev(),
            parallelism: 0,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            artifact_path: default_artifact_path(),
        }
    }
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            round_decimals: default_round_decimals(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            training: TrainingConfig::default(),
            model: ModelConfig::default(),
            recommend: RecommendConfig::default(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file, then environment
    /// variables (`BOOKREC__TRAINING__FOLD_COUNT=3`), later sources winning.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = match file {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => builder.add_source(config::File::with_name("bookrec").required(false)),
        };

        let config = builder
            .add_source(
                config::Environment::with_prefix("BOOKREC")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("training.grid.n_factors")
                    .with_list_parse_key("training.grid.learning_rates")
                    .with_list_parse_key("training.grid.regularizations")
                    .with_list_parse_key("training.grid.epochs"),
            )
            .build()?;
        config.try_deserialize()
    }

    /// Reject settings that would make a training run meaningless.
    pub fn validate(&self) -> RecResult<()> {
        self.training.validate()?;
        if self.recommend.top_k == 0 {
            return Err(RecError::Config("recommend.top_k must be at least 1".into()));
        }
        Ok(())
    }
}

impl TrainingConfig {
    /// Same settings with the grid narrowed to one configuration.
    pub fn with_single(&self, params: Hyperparameters) -> Self {
        Self {
            grid: ParamGrid::single(params),
            ..self.clone()
        }
    }

    pub fn validate(&self) -> RecResult<()> {
        if !self.rating_scale.is_valid() {
            return Err(RecError::Config(format!(
                "rating_scale must satisfy min < max, got [{}, {}]",
                self.rating_scale.min, self.rating_scale.max
            )));
        }
        if self.fold_count < 2 {
            return Err(RecError::Config(format!(
                "fold_count must be at least 2, got {}",
                self.fold_count
            )));
        }
        if self.grid.is_empty() {
            return Err(RecError::Config("hyperparameter grid is empty".into()));
        }
        if self.grid.n_factors.contains(&0) {
            return Err(RecError::Config("n_factors must be positive".into()));
        }
        if self.grid.epochs.contains(&0) {
            return Err(RecError::Config("epochs must be positive".into()));
        }
        if self
            .grid
            .learning_rates
            .iter()
            .any(|lr| !lr.is_finite() || *lr <= 0.0)
        {
            return Err(RecError::Config("learning rates must be positive".into()));
        }
        if self
            .grid
            .regularizations
            .iter()
            .any(|reg| !reg.is_finite() || *reg < 0.0)
        {
            return Err(RecError::Config("regularizations must be non-negative".into()));
        }
        if !self.init_std_dev.is_finite() || self.init_std_dev <= 0.0 {
            return Err(RecError::Config("init_std_dev must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.training.fold_count, 5);
        assert_eq!(config.recommend.top_k, 10);
        assert_eq!(config.data.item_column, "Book-Title");
    }

    #[test]
    fn test_rejects_single_fold() {
        let mut config = AppConfig::default();
        config.training.fold_count = 1;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, RecError::Config(_)));
    }

    #[test]
    fn test_rejects_degenerate_scale() {
        let mut config = AppConfig::default();
        config.training.rating_scale = RatingScale::new(10.0, 1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_grid() {
        let mut config = AppConfig::default();
        config.training.grid.learning_rates.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_toml_section() {
        let raw = r#"{"training": {"fold_count": 3, "grid": {"n_factors": [8]}}}"#;
        let config: AppConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.training.fold_count, 3);
        assert_eq!(config.training.grid.n_factors, vec![8]);
        assert_eq!(config.training.grid.learning_rates, vec![0.002, 0.005, 0.01]);
        assert_eq!(config.api.http_port, 8080);
    }

    #[test]
    fn test_single_configuration_is_validated() {
        let training = TrainingConfig::default();
        let ok = Hyperparameters {
            n_factors: 20,
            ..Hyperparameters::default()
        };
        assert!(training.with_single(ok).validate().is_ok());
        assert_eq!(training.with_single(ok).grid.expand(), vec![ok]);

        let zero_lr = Hyperparameters {
            learning_rate: 0.0,
            ..ok
        };
        assert!(matches!(
            training.with_single(zero_lr).validate(),
            Err(RecError::Config(_))
        ));

        let zero_factors = Hyperparameters { n_factors: 0, ..ok };
        assert!(training.with_single(zero_factors).validate().is_err());
    }
}
