//! Feedback loop and lazy knowledge-graph gate for Tessera.
//!
//! The retrieval path produces scored fragments quickly; the knowledge graph
//! absorbs facts slowly. This crate sits between the two:
//!
//! - [`LazyGate`] loads the expensive graph client at most once, on demand,
//!   and degrades to `None` when it cannot be loaded.
//! - [`FeedbackLoop`] admits findings above a confidence threshold, merges
//!   equivalent submissions under a content-addressed id, verifies them once
//!   corroborated, and promotes verified findings into the graph.
//! - [`spawn_sweeper`] drives promotion on a timer.
//!
//! ```text
//!  fragments ──▶ FeedbackLoop ──verified──▶ process_pending ──▶ LazyGate ──▶ graph
//! ```

pub mod error;
pub mod feedback;
pub mod finding;
pub mod fragment;
pub mod gate;
pub mod subsystem;
pub mod sweeper;

pub use error::{MemoryError, Result};
pub use feedback::{FeedbackLoop, FeedbackSettings, FeedbackStats};
pub use finding::{Finding, FindingState, ID_LENGTH, generate_id, normalize_content, normalize_entities};
pub use fragment::{FragmentMetadata, ScoredFragment, UNKNOWN_SOURCE};
pub use gate::{Availability, GateStatus, LazyGate};
pub use subsystem::{Diagnostics, GRAPH_SUBSYSTEM, GraphGate, collect_diagnostics};
pub use sweeper::{SweepReport, run_sweep, spawn_sweeper};
