//! Application state shared across handlers.

use std::sync::Arc;

use tessera_memory::{Diagnostics, FeedbackLoop, GraphGate, collect_diagnostics};

use crate::config::ServerConfig;
use crate::ratelimit::{SharedRateLimiter, create_rate_limiter};

/// Application state shared across all handlers.
///
/// The gate and the feedback loop are built once at startup and shared by
/// every request; nothing here is a process-wide singleton.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,

    /// Lazy gate around the knowledge-graph client.
    pub gate: Arc<GraphGate>,

    /// Finding deduplication and verification.
    pub feedback: Arc<FeedbackLoop>,

    /// API rate limiter, sized from `config.api_rpm`.
    pub limiter: SharedRateLimiter,
}

impl AppState {
    /// Create a new application state.
    pub fn new(config: ServerConfig, gate: Arc<GraphGate>, feedback: Arc<FeedbackLoop>) -> Self {
        let limiter = create_rate_limiter(config.api_rpm);
        Self {
            config: Arc::new(config),
            gate,
            feedback,
            limiter,
        }
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Gate and loop status. Never loads the graph.
    pub fn diagnostics(&self) -> Diagnostics {
        collect_diagnostics(&self.gate, &self.feedback)
    }
}
