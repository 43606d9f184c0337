//! REST handlers for recommendations and operational endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use bookrec_core::error::{ErrorKind, RecError};
use bookrec_recommend::{RecommendEngine, RecommendationResponse};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Maximum identifier length accepted at the boundary.
const MAX_FIELD_LEN: usize = 512;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RecommendEngine>,
    pub artifact_path: Arc<PathBuf>,
    pub start_time: Instant,
}

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub user_id: String,
    pub favorite_book: String,
}

impl RecommendRequest {
    /// Trim both fields; titles in the cleaned table are lower-case.
    fn normalized(&self) -> (String, String) {
        (
            self.user_id.trim().to_string(),
            self.favorite_book.trim().to_lowercase(),
        )
    }
}

fn validate(user_id: &str, favorite: &str) -> Result<(), &'static str> {
    if user_id.is_empty() {
        return Err("'user_id' must not be empty");
    }
    if favorite.is_empty() {
        return Err("'favorite_book' must not be empty");
    }
    if user_id.len() > MAX_FIELD_LEN || favorite.len() > MAX_FIELD_LEN {
        return Err("request field exceeds maximum length");
    }
    Ok(())
}

/// POST /v1/recommend
pub async fn handle_recommend(
    State(state): State<AppState>,
    Json(request): Json<RecommendRequest>,
) -> Result<Json<RecommendationResponse>, ErrorResponse> {
    metrics::counter!("api.recommend.requests").increment(1);

    let (user_id, favorite) = request.normalized();
    if let Err(msg) = validate(&user_id, &favorite) {
        warn!(error = msg, "Recommendation request validation failed");
        return Err(ErrorResponse::new(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            msg.to_string(),
        ));
    }

    // Scoring the whole catalog is CPU-bound.
    let engine = state.engine.clone();
    let result = tokio::task::spawn_blocking(move || engine.recommend(&user_id, &favorite))
        .await
        .map_err(|e| {
            error!(error = %e, "Recommendation task panicked");
            metrics::counter!("api.errors").increment(1);
            ErrorResponse::internal()
        })?;

    result.map(Json).map_err(ErrorResponse::from)
}

/// POST /v1/model/reload. Swaps in the artifact at the configured path.
pub async fn handle_reload(
    State(state): State<AppState>,
) -> Result<Json<ReloadResponse>, ErrorResponse> {
    let engine = state.engine.clone();
    let path = state.artifact_path.clone();
    tokio::task::spawn_blocking(move || engine.reload(path.as_path()))
        .await
        .map_err(|e| {
            error!(error = %e, "Reload task panicked");
            metrics::counter!("api.errors").increment(1);
            ErrorResponse::internal()
        })?
        .map_err(ErrorResponse::from)?;

    let model = state.engine.snapshot();
    info!(trained_at = %model.trained_at(), "Model reloaded via API");
    Ok(Json(ReloadResponse {
        status: "reloaded".to_string(),
        model_trained_at: model.trained_at().to_rfc3339(),
    }))
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let model = state.engine.snapshot();
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        catalog_size: state.engine.catalog().len(),
        model_users: model.users().len(),
        model_items: model.items().len(),
    })
}

/// GET /ready. Ready once a non-empty catalog is loaded.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.engine.catalog().is_empty() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

/// GET /live
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ErrorResponse {
    status: StatusCode,
    body: ErrorBody,
}

impl ErrorResponse {
    fn new(status: StatusCode, error: &str, message: String) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.to_string(),
                message,
            },
        }
    }

    fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "recommendation_failed",
            "Internal processing error".to_string(),
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<RecError> for ErrorResponse {
    fn from(err: RecError) -> Self {
        match err.kind() {
            ErrorKind::UnknownFavorite => {
                metrics::counter!("api.recommend.not_found").increment(1);
                Self::new(
                    StatusCode::NOT_FOUND,
                    ErrorKind::UnknownFavorite.as_str(),
                    "Book not found in dataset".to_string(),
                )
            }
            ErrorKind::InvalidInput => Self::new(
                StatusCode::BAD_REQUEST,
                ErrorKind::InvalidInput.as_str(),
                err.to_string(),
            ),
            kind => {
                error!(error = %err, kind = kind.as_str(), "Recommendation failed");
                metrics::counter!("api.errors").increment(1);
                Self::internal()
            }
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Serialize)]
pub struct ReloadResponse {
    pub status: String,
    pub model_trained_at: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub catalog_size: usize,
    pub model_users: usize,
    pub model_items: usize,
}
