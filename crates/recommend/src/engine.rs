//! Serving engine: owns the current model snapshot and the candidate catalog,
//! and answers recommendation requests against them.

use crate::ranker;
use bookrec_core::config::RecommendConfig;
use bookrec_core::error::RecResult;
use bookrec_core::types::RecommendationItem;
use bookrec_factorization::{FactorModel, ModelStore};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationResponse {
    pub request_id: Uuid,
    pub user_id: String,
    pub favorite_item: String,
    pub recommendations: Vec<RecommendationItem>,
    pub generated_at: DateTime<Utc>,
    pub model_trained_at: DateTime<Utc>,
}

/// Thread-safe recommendation engine.
///
/// The model is held as an immutable `Arc` snapshot. A request clones the
/// `Arc` once and scores entirely against it, so a concurrent reload never
/// changes the model underneath a running request.
pub struct RecommendEngine {
    model: RwLock<Arc<FactorModel>>,
    catalog: Arc<Vec<String>>,
    config: RecommendConfig,
}

impl RecommendEngine {
    pub fn new(model: FactorModel, catalog: Vec<String>, config: RecommendConfig) -> Self {
        info!(
            users = model.users().len(),
            items = model.items().len(),
            catalog = catalog.len(),
            "Recommendation engine initialized"
        );
        Self {
            model: RwLock::new(Arc::new(model)),
            catalog: Arc::new(catalog),
            config,
        }
    }

    /// Load the model artifact at `path` and serve it over `catalog`.
    pub fn load<P: AsRef<Path>>(
        path: P,
        catalog: Vec<String>,
        config: RecommendConfig,
    ) -> RecResult<Self> {
        let model = ModelStore::load(path)?;
        Ok(Self::new(model, catalog, config))
    }

    /// Current model snapshot.
    pub fn snapshot(&self) -> Arc<FactorModel> {
        self.model.read().clone()
    }

    /// Hot-swap a newly trained model without downtime. On failure the
    /// current model stays in place.
    pub fn reload<P: AsRef<Path>>(&self, path: P) -> RecResult<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Hot-reloading model");
        let new_model = Arc::new(ModelStore::load(path)?);
        *self.model.write() = new_model;
        info!("Model hot-reload complete");
        Ok(())
    }

    pub fn catalog(&self) -> &[String] {
        &self.catalog
    }

    pub fn config(&self) -> &RecommendConfig {
        &self.config
    }

    pub fn recommend(&self, user_id: &str, favorite_item: &str) -> RecResult<RecommendationResponse> {
        let model = self.snapshot();

        debug!(
            user_id,
            favorite_item,
            candidates = self.catalog.len(),
            "Scoring catalog"
        );

        let recommendations = ranker::recommend(
            &model,
            user_id,
            favorite_item,
            &self.catalog,
            self.config.top_k,
            self.config.round_decimals,
        )?;

        Ok(RecommendationResponse {
            request_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            favorite_item: favorite_item.to_string(),
            recommendations,
            generated_at: Utc::now(),
            model_trained_at: model.trained_at(),
        })
    }
}
