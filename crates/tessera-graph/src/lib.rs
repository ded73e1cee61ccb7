//! Knowledge-graph subsystem for Tessera.
//!
//! The graph is the slow half of the system: documents are staged with
//! `add`, turned into entities and relationships by `cognify`, and queried
//! with `search`. Callers only see the [`KnowledgeGraph`] trait, so the
//! graphqlite backend and the test mock are interchangeable.
//!
//! ```text
//! ┌────────────────────────────┐
//! │  KnowledgeGraph trait      │
//! │  initialize / add /        │
//! │  cognify / reset / search  │
//! └────────────────────────────┘
//!          │            │
//!          ▼            ▼
//!   ┌────────────┐ ┌──────────────────┐
//!   │ GraphStore │ │MockKnowledgeGraph│
//!   └────────────┘ └──────────────────┘
//! ```

pub mod client;
pub mod error;
pub mod store;
pub mod types;

pub use client::{KnowledgeGraph, MockKnowledgeGraph, SharedKnowledgeGraph};
pub use error::{GraphError, Result};
pub use store::GraphStore;
pub use types::{GraphDocument, GraphStats, RelationshipType, SearchResult, SearchType};
