//! Data exchanged with the knowledge-graph subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Documents
// ─────────────────────────────────────────────────────────────────────────────

/// A unit of knowledge submitted through `add`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    /// Stable identifier of the document (the finding id).
    pub id: String,
    /// Fact text.
    pub content: String,
    /// Every source that reported this fact.
    pub sources: Vec<String>,
    /// Entity identifiers the fact references.
    pub entities: Vec<String>,
    /// Query that first produced the fact.
    pub query_context: Option<String>,
    /// Confidence of the most recent submission.
    pub confidence: f64,
    /// When the fact was first observed.
    pub observed_at: DateTime<Utc>,
}

impl GraphDocument {
    /// Create a document with no sources or entities.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            sources: Vec::new(),
            entities: Vec::new(),
            query_context: None,
            confidence: 1.0,
            observed_at: Utc::now(),
        }
    }

    /// Add a source.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }

    /// Add an entity reference.
    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entities.push(entity.into());
        self
    }

    /// Set the originating query.
    pub fn with_query_context(mut self, query: impl Into<String>) -> Self {
        self.query_context = Some(query.into());
        self
    }

    /// Set the confidence.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Search
// ─────────────────────────────────────────────────────────────────────────────

/// How a search query is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    /// Match query terms against document text.
    #[default]
    Chunks,
    /// Match query terms against entities and return the facts mentioning them.
    Insights,
}

impl SearchType {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chunks => "chunks",
            Self::Insights => "insights",
        }
    }
}

impl std::fmt::Display for SearchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SearchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chunks" => Ok(Self::Chunks),
            "insights" => Ok(Self::Insights),
            other => Err(format!("unknown search type '{}'", other)),
        }
    }
}

/// A record returned by `search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Document identifier.
    pub id: String,
    /// Dataset the document was added to.
    pub dataset: String,
    /// Fact text.
    pub content: String,
    /// Relevance in [0, 1].
    pub score: f32,
    /// Entities that matched (insights) or that the fact references (chunks).
    pub entities: Vec<String>,
    /// Sources of the fact.
    pub sources: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Graph primitives
// ─────────────────────────────────────────────────────────────────────────────

/// Relationship types written by `cognify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    /// Fact is cited in a source.
    CitedIn,
    /// Fact mentions an entity.
    Mentions,
    /// Fact belongs to a dataset.
    PartOf,
}

impl RelationshipType {
    /// Get the string representation for graph edges.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CitedIn => "CITED_IN",
            Self::Mentions => "MENTIONS",
            Self::PartOf => "PART_OF",
        }
    }
}

/// Statistics about the graph store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Number of nodes in the graph.
    pub node_count: usize,
    /// Number of relationships in the graph.
    pub relationship_count: usize,
    /// Documents added but not yet cognified.
    pub staged_count: usize,
}
