//! API server: HTTP routes plus the optional Prometheus exporter.

use crate::rest::{self, AppState};
use axum::routing::{get, post};
use axum::Router;
use bookrec_core::config::AppConfig;
use bookrec_recommend::RecommendEngine;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct ApiServer {
    config: AppConfig,
    engine: Arc<RecommendEngine>,
}

impl ApiServer {
    pub fn new(config: AppConfig, engine: Arc<RecommendEngine>) -> Self {
        Self { config, engine }
    }

    /// Build the router without binding a socket.
    pub fn router(&self) -> Router {
        let state = AppState {
            engine: self.engine.clone(),
            artifact_path: Arc::new(PathBuf::from(&self.config.model.artifact_path)),
            start_time: Instant::now(),
        };

        Router::new()
            .route("/v1/recommend", post(rest::handle_recommend))
            .route("/v1/model/reload", post(rest::handle_reload))
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Start the HTTP server; runs until the listener fails.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = self.router();
        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use bookrec_core::config::RecommendConfig;
    use bookrec_core::types::{Hyperparameters, RatingRecord};
    use bookrec_factorization::{RatingMatrix, SgdTrainer};
    use tower::ServiceExt;

    fn server() -> ApiServer {
        let records = vec![
            RatingRecord::new("u1", "a", 8.0),
            RatingRecord::new("u1", "b", 5.0),
            RatingRecord::new("u2", "a", 9.0),
            RatingRecord::new("u2", "c", 7.0),
        ];
        let matrix = RatingMatrix::build(&records).unwrap();
        let params = Hyperparameters {
            n_factors: 3,
            n_epochs: 10,
            ..Hyperparameters::default()
        };
        let model = SgdTrainer::default().train(&matrix, &params).unwrap();
        let catalog = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let engine = RecommendEngine::new(model, catalog, RecommendConfig::default());

        let mut config = AppConfig::default();
        config.model.artifact_path = "/nonexistent/bookrec-model.json".to_string();
        ApiServer::new(config, Arc::new(engine))
    }

    fn recommend_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/recommend")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_recommend_ok() {
        let app = server().router();
        let response = app
            .oneshot(recommend_request(r#"{"user_id":" u1 ","favorite_book":" A "}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["user_id"], "u1");
        assert_eq!(json["favorite_item"], "a");
        let recs = json["recommendations"].as_array().unwrap();
        assert_eq!(recs.len(), 2);
        assert!(recs.iter().all(|r| r["item_id"] != "a"));
    }

    #[tokio::test]
    async fn test_recommend_unknown_book_is_404() {
        let app = server().router();
        let response = app
            .oneshot(recommend_request(r#"{"user_id":"u1","favorite_book":"dune"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"], "unknown_favorite");
    }

    #[tokio::test]
    async fn test_recommend_empty_user_is_400() {
        let app = server().router();
        let response = app
            .oneshot(recommend_request(r#"{"user_id":"  ","favorite_book":"a"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_failed_reload_is_500() {
        let app = server().router();
        let request = Request::builder()
            .method("POST")
            .uri("/v1/model/reload")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_operational_endpoints() {
        let server = server();
        for uri in ["/health", "/ready", "/live"] {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let response = server.router().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
        }
    }
}
