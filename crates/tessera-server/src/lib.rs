//! HTTP API server for Tessera.
//!
//! Exposes the feedback loop and the gated knowledge graph over HTTP.
//!
//! # Features
//!
//! - Finding submission and retrieval-fragment ingest
//! - Diagnostics that never trigger the graph load
//! - Graph search through the lazy gate (empty when unavailable)
//! - Admin sweeps and resets
//! - Token-based authentication, rate limiting, request logging
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tessera_memory::{FeedbackLoop, GraphGate};
//! use tessera_server::{Server, ServerConfig};
//!
//! let gate = Arc::new(GraphGate::from_config(&graph_config));
//! let feedback = Arc::new(FeedbackLoop::from_config(&feedback_config));
//! let config = ServerConfig::new(Some("secret-token".to_string()))
//!     .with_bind_address("127.0.0.1:8080".parse()?);
//!
//! Server::new(config, gate, feedback).run().await?;
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod routes;
pub mod state;

pub use auth::{AuthError, Identity, auth_middleware};
pub use config::ServerConfig;
pub use error::{ErrorResponse, Result, ServerError};
pub use ratelimit::{rate_limit_middleware, request_logging_middleware};
pub use routes::{ApiDoc, SubmitFindingRequest, SubmitFindingResponse};
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, extract::DefaultBodyLimit, middleware};
use tessera_memory::{FeedbackLoop, GraphGate};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The Tessera HTTP server.
pub struct Server {
    /// Application state.
    state: AppState,
}

impl Server {
    /// Create a new server around a gate and a feedback loop.
    pub fn new(config: ServerConfig, gate: Arc<GraphGate>, feedback: Arc<FeedbackLoop>) -> Self {
        Self {
            state: AppState::new(config, gate, feedback),
        }
    }

    /// Create a server from a pre-built application state.
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// Application state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        Router::new()
            // Health and docs (no auth)
            .merge(routes::health_routes())
            .merge(routes::openapi_routes())
            .nest("/api/v1", self.api_routes())
            .layer(DefaultBodyLimit::max(self.state.config.max_body_size))
            // Request logging (inner layer, runs first)
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                ratelimit::request_logging_middleware,
            ))
            // Rate limiting (outer layer, runs before request logging)
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                ratelimit::rate_limit_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// API routes (v1). All of them require authentication.
    fn api_routes(&self) -> Router<AppState> {
        use axum::routing::{get, post};

        Router::new()
            // Findings
            .route(
                "/findings",
                post(routes::submit_finding_handler).get(routes::list_findings_handler),
            )
            .route("/findings/fragments", post(routes::ingest_fragments_handler))
            .route("/findings/{id}", get(routes::get_finding_handler))
            // Diagnostics
            .route("/diagnostics", get(routes::diagnostics_handler))
            // Graph
            .route("/graph/search", post(routes::graph_search_handler))
            // Admin
            .route("/admin/process", post(routes::process_handler))
            .route("/admin/gate/reset", post(routes::gate_reset_handler))
            .route("/admin/graph/reset", post(routes::graph_reset_handler))
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                auth::auth_middleware,
            ))
    }

    /// Run the server until the process is killed.
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.bind_address;
        self.run_on(addr).await
    }

    /// Run the server on a specific address (useful for testing).
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        self.serve(addr, CancellationToken::new()).await
    }

    /// Run the server until `shutdown` is cancelled, then drain in-flight
    /// requests.
    pub async fn run_until(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.state.config.bind_address;
        self.serve(addr, shutdown).await
    }

    async fn serve(self, addr: SocketAddr, shutdown: CancellationToken) -> Result<()> {
        let router = self.router();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind: {}", e)))?;

        info!("Starting server on {}", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {}", e)))?;

        info!("Server stopped");
        Ok(())
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }
}
