//! OpenAPI documentation.

use axum::{Json, Router, routing::get};
use utoipa::OpenApi;

use super::{admin, diagnostics, findings, graph, health};
use crate::error::ErrorResponse;
use crate::state::AppState;

/// OpenAPI documentation for the Tessera API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tessera API",
        description = "Feedback loop and knowledge-graph API for the Tessera retrieval backend",
        version = "1.0.0",
        license(name = "MIT"),
    ),
    servers(
        (url = "/", description = "Local server"),
    ),
    paths(
        health::health,
        findings::submit_finding_handler,
        findings::ingest_fragments_handler,
        findings::list_findings_handler,
        findings::get_finding_handler,
        diagnostics::diagnostics_handler,
        graph::graph_search_handler,
        admin::process_handler,
        admin::gate_reset_handler,
        admin::graph_reset_handler,
    ),
    components(
        schemas(
            ErrorResponse,
            health::HealthResponse,
            findings::SubmitFindingRequest,
            findings::SubmitFindingResponse,
            findings::IngestFragmentsRequest,
            findings::IngestFragmentsResponse,
            findings::FindingInfo,
            findings::ListFindingsResponse,
            diagnostics::DiagnosticsResponse,
            graph::GraphSearchRequest,
            graph::GraphSearchHit,
            graph::GraphSearchResponse,
            admin::ProcessResponse,
            admin::GateResetResponse,
            admin::GraphResetResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check"),
        (name = "findings", description = "Finding submission and inspection"),
        (name = "diagnostics", description = "Gate and feedback-loop status"),
        (name = "graph", description = "Knowledge-graph queries"),
        (name = "admin", description = "Sweeps and resets"),
    )
)]
pub struct ApiDoc;

/// Add bearer token security scheme.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            );
        }
    }
}

/// GET /api/openapi.json - The OpenAPI document.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Route serving the OpenAPI document (no auth required).
pub fn openapi_routes() -> Router<AppState> {
    Router::new().route("/api/openapi.json", get(openapi_json))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();

        for expected in [
            "/health",
            "/api/v1/findings",
            "/api/v1/findings/fragments",
            "/api/v1/findings/{id}",
            "/api/v1/diagnostics",
            "/api/v1/graph/search",
            "/api/v1/admin/process",
            "/api/v1/admin/gate/reset",
            "/api/v1/admin/graph/reset",
        ] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing {}",
                expected
            );
        }
    }

    #[test]
    fn test_openapi_has_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
