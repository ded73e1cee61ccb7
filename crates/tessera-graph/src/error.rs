//! Error types for the knowledge-graph crate.

use thiserror::Error;

/// Errors returned by a knowledge-graph backend.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The backing store could not be opened.
    #[error("Failed to open graph: {0}")]
    Open(String),

    /// An operation was attempted before `initialize`.
    #[error("Graph not initialized")]
    NotInitialized,

    /// A graph query or mutation failed.
    #[error("Query error: {0}")]
    Query(String),

    /// The submitted data was rejected.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The backend refused the operation.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type alias for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;
