//! Diagnostics endpoint.

use axum::{Extension, Json, extract::State};
use serde::{Deserialize, Serialize};
use tessera_memory::{FeedbackStats, GateStatus};
use utoipa::ToSchema;

use crate::auth::Identity;
use crate::state::AppState;

/// Gate and feedback-loop status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DiagnosticsResponse {
    /// `{name, available, client_loaded, last_error, load_attempted_at, load_count}`.
    #[schema(value_type = Object)]
    pub graph: GateStatus,
    /// Feedback-loop counters.
    #[schema(value_type = Object)]
    pub feedback: FeedbackStats,
    /// Snapshot time (RFC 3339).
    pub generated_at: String,
}

/// GET /api/v1/diagnostics - Gate and feedback-loop status.
///
/// Reports `graph.available = null` until something has needed the graph;
/// asking for diagnostics never loads it.
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Gate and feedback-loop status", body = DiagnosticsResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "diagnostics"
)]
pub async fn diagnostics_handler(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
) -> Json<DiagnosticsResponse> {
    let diagnostics = state.diagnostics();
    Json(DiagnosticsResponse {
        graph: diagnostics.graph,
        feedback: diagnostics.feedback,
        generated_at: diagnostics.generated_at.to_rfc3339(),
    })
}
