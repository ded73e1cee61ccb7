//! Health check endpoint.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};
use tessera_memory::Availability;
use utoipa::ToSchema;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
    /// Knowledge-graph availability: `unknown`, `available` or `unavailable`.
    #[schema(value_type = String)]
    pub graph: Availability,
}

/// Health check (no auth required). Never loads the graph.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    ),
    tag = "health"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        graph: state.gate.availability(),
    })
}

/// Create health check routes.
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tessera_config::GraphConfig;
    use tessera_memory::{FeedbackLoop, GraphGate};
    use tower::ServiceExt;

    use crate::config::ServerConfig;

    #[tokio::test]
    async fn test_health_endpoint() {
        let gate = GraphGate::from_config(&GraphConfig::default());
        let state = AppState::new(
            ServerConfig::default(),
            Arc::new(gate),
            Arc::new(FeedbackLoop::default()),
        );
        let app = health_routes().with_state(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();

        assert_eq!(health.status, "ok");
        assert!(!health.version.is_empty());
        assert_eq!(health.graph, Availability::Unknown);
        assert_eq!(state.gate.get_status().load_count, 0);
    }
}
