//! API routes.

pub mod admin;
pub mod diagnostics;
pub mod findings;
pub mod graph;
pub mod health;
pub mod openapi;

pub use admin::{
    GateResetResponse, GraphResetResponse, ProcessResponse, gate_reset_handler,
    graph_reset_handler, process_handler,
};
pub use diagnostics::{DiagnosticsResponse, diagnostics_handler};
pub use findings::{
    FindingInfo, IngestFragmentsRequest, IngestFragmentsResponse, ListFindingsResponse,
    SubmitFindingRequest, SubmitFindingResponse, get_finding_handler, ingest_fragments_handler,
    list_findings_handler, submit_finding_handler,
};
pub use graph::{GraphSearchHit, GraphSearchRequest, GraphSearchResponse, graph_search_handler};
pub use health::health_routes;
pub use openapi::{ApiDoc, openapi_routes};
