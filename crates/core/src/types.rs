use serde::{Deserialize, Serialize};

/// One row of the cleaned rating table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub user_id: String,
    pub item_id: String,
    pub rating: f64,
}

impl RatingRecord {
    pub fn new(user_id: impl Into<String>, item_id: impl Into<String>, rating: f64) -> Self {
        Self {
            user_id: user_id.into(),
            item_id: item_id.into(),
            rating,
        }
    }
}

/// Closed interval of valid ratings, e.g. `[1, 10]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingScale {
    pub min: f64,
    pub max: f64,
}

impl RatingScale {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, rating: f64) -> bool {
        rating.is_finite() && rating >= self.min && rating <= self.max
    }

    /// Clamp an estimate into the scale. Only applied to served predictions.
    pub fn clip(&self, estimate: f64) -> f64 {
        estimate.clamp(self.min, self.max)
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min < self.max
    }
}

impl Default for RatingScale {
    fn default() -> Self {
        Self {
            min: 1.0,
            max: 10.0,
        }
    }
}

/// Training hyperparameters for one SGD run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    /// Latent factor count F.
    pub n_factors: usize,
    /// Step size η.
    pub learning_rate: f64,
    /// L2 penalty λ, shared by biases and factors.
    pub regularization: f64,
    /// Number of full passes over the training triples.
    pub n_epochs: usize,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            n_factors: 100,
            learning_rate: 0.005,
            regularization: 0.02,
            n_epochs: 20,
        }
    }
}

impl std::fmt::Display for Hyperparameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "factors={} lr={} reg={} epochs={}",
            self.n_factors, self.learning_rate, self.regularization, self.n_epochs
        )
    }
}

/// Hyperparameter grid expressed as one list of candidate values per axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    #[serde(default = "default_grid_factors")]
    pub n_factors: Vec<usize>,
    #[serde(default = "default_grid_learning_rates")]
    pub learning_rates: Vec<f64>,
    #[serde(default = "default_grid_regularizations")]
    pub regularizations: Vec<f64>,
    #[serde(default = "default_grid_epochs")]
    pub epochs: Vec<usize>,
}

fn default_grid_factors() -> Vec<usize> {
    vec![50, 100, 150]
}
fn default_grid_learning_rates() -> Vec<f64> {
    vec![0.002, 0.005, 0.01]
}
fn default_grid_regularizations() -> Vec<f64> {
    vec![0.02, 0.05, 0.1]
}
fn default_grid_epochs() -> Vec<usize> {
    vec![20]
}

impl ParamGrid {
    /// Grid with exactly one candidate.
    pub fn single(params: Hyperparameters) -> Self {
        Self {
            n_factors: vec![params.n_factors],
            learning_rates: vec![params.learning_rate],
            regularizations: vec![params.regularization],
            epochs: vec![params.n_epochs],
        }
    }

    /// Cartesian product of the axes. Factors vary slowest, epochs fastest.
    pub fn expand(&self) -> Vec<Hyperparameters> {
        let mut out = Vec::with_capacity(self.len());
        for &n_factors in &self.n_factors {
            for &learning_rate in &self.learning_rates {
                for &regularization in &self.regularizations {
                    for &n_epochs in &self.epochs {
                        out.push(Hyperparameters {
                            n_factors,
                            learning_rate,
                            regularization,
                            n_epochs,
                        });
                    }
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.n_factors.len()
            * self.learning_rates.len()
            * self.regularizations.len()
            * self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            n_factors: default_grid_factors(),
            learning_rates: default_grid_learning_rates(),
            regularizations: default_grid_regularizations(),
            epochs: default_grid_epochs(),
        }
    }
}

/// A single ranked prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub item_id: String,
    pub estimated_rating: f64,
}
