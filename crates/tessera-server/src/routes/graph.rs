//! Knowledge-graph search endpoint.

use axum::{Extension, Json, extract::State};
use serde::{Deserialize, Serialize};
use tessera_graph::{SearchResult, SearchType};
use tracing::warn;
use utoipa::ToSchema;

use crate::auth::Identity;
use crate::error::ServerError;
use crate::state::AppState;

/// Request to search the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GraphSearchRequest {
    /// Search text.
    pub query: String,
    /// `chunks` (default) or `insights`.
    #[serde(default)]
    #[schema(value_type = String)]
    pub search_type: SearchType,
    /// Maximum results.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

/// One search hit.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GraphSearchHit {
    pub id: String,
    pub dataset: String,
    pub content: String,
    pub score: f32,
    pub entities: Vec<String>,
    pub sources: Vec<String>,
}

impl From<SearchResult> for GraphSearchHit {
    fn from(result: SearchResult) -> Self {
        Self {
            id: result.id,
            dataset: result.dataset,
            content: result.content,
            score: result.score,
            entities: result.entities,
            sources: result.sources,
        }
    }
}

/// Response for a graph search.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GraphSearchResponse {
    pub results: Vec<GraphSearchHit>,
    pub query: String,
    pub count: usize,
    /// `false` when the graph is disabled or failed to load; `results` is
    /// then empty.
    pub graph_available: bool,
}

/// POST /api/v1/graph/search - Search the knowledge graph.
///
/// Loads the graph on first use. When the graph is disabled or failed to
/// load the search degrades to an empty result with `graph_available: false`.
#[utoipa::path(
    post,
    path = "/api/v1/graph/search",
    request_body = GraphSearchRequest,
    responses(
        (status = 200, description = "Search results", body = GraphSearchResponse),
        (status = 400, description = "Empty query"),
        (status = 401, description = "Unauthorized"),
        (status = 503, description = "Knowledge graph search failed"),
    ),
    security(("bearer_auth" = [])),
    tag = "graph"
)]
pub async fn graph_search_handler(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
    Json(request): Json<GraphSearchRequest>,
) -> Result<Json<GraphSearchResponse>, ServerError> {
    if request.query.trim().is_empty() {
        return Err(ServerError::BadRequest("query must not be empty".to_string()));
    }

    let Some(client) = state.gate.get_client().await else {
        return Ok(Json(GraphSearchResponse {
            results: Vec::new(),
            query: request.query,
            count: 0,
            graph_available: false,
        }));
    };

    let mut results = client
        .search(&request.query, request.search_type)
        .await
        .map_err(|e| {
            warn!(error = %e, search_type = %request.search_type, "Graph search failed");
            ServerError::ServiceUnavailable("knowledge graph search failed".to_string())
        })?;
    results.truncate(request.limit);

    let results: Vec<GraphSearchHit> = results.into_iter().map(GraphSearchHit::from).collect();
    Ok(Json(GraphSearchResponse {
        count: results.len(),
        query: request.query,
        results,
        graph_available: true,
    }))
}
