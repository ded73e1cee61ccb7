//! Admin endpoints: manual sweeps and resets.

use axum::{Extension, Json, extract::State};
use serde::{Deserialize, Serialize};
use tessera_memory::{GateStatus, run_sweep};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::auth::Identity;
use crate::error::ServerError;
use crate::state::AppState;

/// Result of a manual sweep.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProcessResponse {
    /// Verified findings written to the graph.
    pub persisted: usize,
    /// Expired findings dropped.
    pub evicted: usize,
    /// Findings still pending afterwards.
    pub pending_count: usize,
    /// Whether the graph is usable.
    pub graph_available: bool,
}

/// Gate status after a reset.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GateResetResponse {
    #[schema(value_type = Object)]
    pub gate: GateStatus,
}

/// Result of a graph reset.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GraphResetResponse {
    pub reset: bool,
}

/// POST /api/v1/admin/process - Persist verified findings now.
///
/// Succeeds with `persisted = 0` when the graph is unavailable.
#[utoipa::path(
    post,
    path = "/api/v1/admin/process",
    responses(
        (status = 200, description = "Sweep finished", body = ProcessResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn process_handler(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
) -> Json<ProcessResponse> {
    let report = run_sweep(&state.gate, &state.feedback).await;
    info!(
        persisted = report.persisted,
        evicted = report.evicted,
        "Manual sweep"
    );

    Json(ProcessResponse {
        persisted: report.persisted,
        evicted: report.evicted,
        pending_count: state.feedback.get_statistics().pending_count,
        graph_available: state.gate.is_available(),
    })
}

/// POST /api/v1/admin/gate/reset - Forget a cached graph client or failure.
#[utoipa::path(
    post,
    path = "/api/v1/admin/gate/reset",
    responses(
        (status = 200, description = "Gate reset", body = GateResetResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn gate_reset_handler(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
) -> Json<GateResetResponse> {
    state.gate.reset().await;
    info!(subsystem = %state.gate.name(), "Gate reset by admin");
    Json(GateResetResponse {
        gate: state.gate.get_status(),
    })
}

/// POST /api/v1/admin/graph/reset - Delete everything in the knowledge graph.
#[utoipa::path(
    post,
    path = "/api/v1/admin/graph/reset",
    responses(
        (status = 200, description = "Graph cleared", body = GraphResetResponse),
        (status = 401, description = "Unauthorized"),
        (status = 503, description = "Knowledge graph unavailable"),
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn graph_reset_handler(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
) -> Result<Json<GraphResetResponse>, ServerError> {
    let client = state
        .gate
        .get_client()
        .await
        .ok_or_else(|| ServerError::ServiceUnavailable("knowledge graph".to_string()))?;

    client.reset().await.map_err(|e| {
        warn!(error = %e, "Graph reset failed");
        ServerError::ServiceUnavailable("knowledge graph reset failed".to_string())
    })?;

    info!(backend = client.name(), "Knowledge graph reset by admin");
    Ok(Json(GraphResetResponse { reset: true }))
}
