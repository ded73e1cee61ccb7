//! Error types for the memory crate.
//!
//! None of these escape the public API of [`crate::LazyGate`] or
//! [`crate::FeedbackLoop`]: they are recorded (as `last_error` strings) and
//! logged, while callers see `None` or a count.

use std::time::Duration;

use thiserror::Error;

/// Failures absorbed by the gate and the feedback loop.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The subsystem is disabled or failed to load.
    #[error("Subsystem unavailable: {0}")]
    SubsystemUnavailable(String),

    /// An operation exceeded its time budget.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The knowledge graph rejected a single finding.
    #[error("Failed to persist finding {finding_id}: {source}")]
    Persistence {
        finding_id: String,
        source: tessera_graph::GraphError,
    },
}

/// Result type alias for memory operations.
pub type Result<T> = std::result::Result<T, MemoryError>;
