//! Finding submission and inspection endpoints.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use tessera_memory::{Finding, ScoredFragment};
use utoipa::ToSchema;

use crate::auth::Identity;
use crate::error::ServerError;
use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Request to submit a finding.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitFindingRequest {
    /// Fact text.
    pub content: String,
    /// Document or system that produced the fact.
    pub source: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Query that produced the fact.
    #[serde(default)]
    pub query_context: String,
    /// Entity identifiers the fact references.
    #[serde(default)]
    pub entity_references: Vec<String>,
}

/// Result of a submission.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitFindingResponse {
    /// Finding id, `null` when rejected.
    pub id: Option<String>,
    /// Whether admission control rejected the submission.
    pub rejected: bool,
}

/// Request to ingest the fragments of one retrieval answer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IngestFragmentsRequest {
    /// Query the fragments answered.
    #[serde(default)]
    pub query: String,
    /// Scored fragments: `{text, score, metadata: {doc_id, entities, ...}}`.
    #[schema(value_type = Vec<Object>)]
    pub fragments: Vec<ScoredFragment>,
}

/// Result of a fragment ingest.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IngestFragmentsResponse {
    /// Ids of the admitted fragments.
    pub ids: Vec<String>,
    /// Number of fragments admitted.
    pub admitted: usize,
    /// Number of fragments rejected.
    pub rejected: usize,
}

/// A pending finding.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FindingInfo {
    pub id: String,
    pub content: String,
    /// Most recent source.
    pub source: String,
    /// Every source that reported the finding.
    pub sources: Vec<String>,
    pub confidence: f64,
    pub max_confidence: f64,
    /// `unverified` or `verified`.
    pub state: String,
    pub verified: bool,
    pub verification_count: u32,
    pub persist_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub query_context: String,
    pub entity_references: Vec<String>,
    /// Creation time (RFC 3339).
    pub created_at: String,
    /// Most recent submission (RFC 3339).
    pub last_seen_at: String,
}

impl From<Finding> for FindingInfo {
    fn from(finding: Finding) -> Self {
        let state = match finding.state() {
            tessera_memory::FindingState::Unverified => "unverified",
            tessera_memory::FindingState::Verified => "verified",
        };
        Self {
            state: state.to_string(),
            sources: finding.sources.into_iter().collect(),
            created_at: finding.timestamp.to_rfc3339(),
            last_seen_at: finding.last_seen.to_rfc3339(),
            id: finding.id,
            content: finding.content,
            source: finding.source,
            confidence: finding.confidence,
            max_confidence: finding.max_confidence,
            verified: finding.verified,
            verification_count: finding.verification_count,
            persist_attempts: finding.persist_attempts,
            last_error: finding.last_error,
            query_context: finding.query_context,
            entity_references: finding.entity_references,
        }
    }
}

/// Query params for listing pending findings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListFindingsQuery {
    /// Only verified findings.
    #[serde(default)]
    pub verified: Option<bool>,
    /// Maximum number of findings to return.
    pub limit: Option<usize>,
}

/// Response for listing pending findings.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListFindingsResponse {
    /// Pending findings, oldest first.
    pub findings: Vec<FindingInfo>,
    /// Total matching count (before `limit`).
    pub total: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/findings - Submit a finding.
#[utoipa::path(
    post,
    path = "/api/v1/findings",
    request_body = SubmitFindingRequest,
    responses(
        (status = 200, description = "Finding admitted or rejected", body = SubmitFindingResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "findings"
)]
pub async fn submit_finding_handler(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
    Json(request): Json<SubmitFindingRequest>,
) -> Result<Json<SubmitFindingResponse>, ServerError> {
    if request.source.trim().is_empty() {
        return Err(ServerError::BadRequest("source must not be empty".to_string()));
    }

    let id = state.feedback.add_finding(
        &request.content,
        request.source.trim(),
        request.confidence,
        &request.query_context,
        &request.entity_references,
    );

    Ok(Json(SubmitFindingResponse {
        rejected: id.is_none(),
        id,
    }))
}

/// POST /api/v1/findings/fragments - Ingest retrieval fragments.
#[utoipa::path(
    post,
    path = "/api/v1/findings/fragments",
    request_body = IngestFragmentsRequest,
    responses(
        (status = 200, description = "Fragments ingested", body = IngestFragmentsResponse),
        (status = 400, description = "Too many fragments"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "findings"
)]
pub async fn ingest_fragments_handler(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
    Json(request): Json<IngestFragmentsRequest>,
) -> Result<Json<IngestFragmentsResponse>, ServerError> {
    let max = state.config.max_fragments;
    if request.fragments.len() > max {
        return Err(ServerError::BadRequest(format!(
            "{} fragments exceeds the limit of {}",
            request.fragments.len(),
            max
        )));
    }

    let ids = state
        .feedback
        .ingest_fragments(&request.query, &request.fragments);

    Ok(Json(IngestFragmentsResponse {
        admitted: ids.len(),
        rejected: request.fragments.len() - ids.len(),
        ids,
    }))
}

/// GET /api/v1/findings - List pending findings.
#[utoipa::path(
    get,
    path = "/api/v1/findings",
    params(
        ("verified" = Option<bool>, Query, description = "Filter by verification state"),
        ("limit" = Option<usize>, Query, description = "Maximum findings to return"),
    ),
    responses(
        (status = 200, description = "Pending findings", body = ListFindingsResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "findings"
)]
pub async fn list_findings_handler(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
    Query(query): Query<ListFindingsQuery>,
) -> Result<Json<ListFindingsResponse>, ServerError> {
    let mut findings = state.feedback.pending_findings();

    if let Some(verified) = query.verified {
        findings.retain(|f| f.verified == verified);
    }

    let total = findings.len();
    if let Some(limit) = query.limit {
        findings.truncate(limit);
    }

    Ok(Json(ListFindingsResponse {
        findings: findings.into_iter().map(FindingInfo::from).collect(),
        total,
    }))
}

/// GET /api/v1/findings/{id} - Inspect a pending finding.
#[utoipa::path(
    get,
    path = "/api/v1/findings/{id}",
    params(
        ("id" = String, Path, description = "Finding ID"),
    ),
    responses(
        (status = 200, description = "Finding found", body = FindingInfo),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Not pending (never submitted, persisted, or evicted)"),
    ),
    security(("bearer_auth" = [])),
    tag = "findings"
)]
pub async fn get_finding_handler(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<FindingInfo>, ServerError> {
    state
        .feedback
        .get_finding(&id)
        .map(|finding| Json(FindingInfo::from(finding)))
        .ok_or_else(|| ServerError::NotFound(format!("Finding {} is not pending", id)))
}
