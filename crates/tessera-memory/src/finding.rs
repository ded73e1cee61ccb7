//! Findings and their content-addressed identity.
//!
//! Two submissions describe the same finding when their normalized content
//! and normalized entity set match. The id is derived from exactly those two
//! inputs, so it is stable across processes and independent of the order in
//! which entities were listed.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tessera_graph::GraphDocument;

/// Number of hex characters kept from the SHA-256 digest.
pub const ID_LENGTH: usize = 16;

const CONTENT_SEPARATOR: char = '\u{1f}';
const ENTITY_SEPARATOR: &str = "\u{1e}";

/// Lowercase, trim, and collapse internal whitespace runs to one space.
pub fn normalize_content(content: &str) -> String {
    content
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Trim and lowercase each entity, drop empties, then sort and dedupe.
pub fn normalize_entities<S: AsRef<str>>(entities: &[S]) -> Vec<String> {
    entities
        .iter()
        .map(|e| e.as_ref().trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Deterministic id for a (content, entities) pair.
pub fn generate_id<S: AsRef<str>>(content: &str, entity_references: &[S]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_content(content).as_bytes());
    hasher.update(CONTENT_SEPARATOR.to_string().as_bytes());
    hasher.update(normalize_entities(entity_references).join(ENTITY_SEPARATOR).as_bytes());

    let mut id = hex::encode(hasher.finalize());
    id.truncate(ID_LENGTH);
    id
}

/// Verification state of a pending finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingState {
    /// Seen fewer times than the verification threshold.
    Unverified,
    /// Corroborated often enough to be persisted.
    Verified,
}

/// A candidate fact waiting in the feedback loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    /// Text of the first submission, trimmed.
    pub content: String,
    /// Most recent reporting source.
    pub source: String,
    /// Every source that reported this finding.
    pub sources: BTreeSet<String>,
    /// Confidence of the most recent admitted submission.
    pub confidence: f64,
    pub max_confidence: f64,
    /// Creation time. Never updated on merge.
    pub timestamp: DateTime<Utc>,
    /// Time of the most recent admitted submission.
    pub last_seen: DateTime<Utc>,
    /// Query that first produced the finding.
    pub query_context: String,
    /// Normalized entity references; part of the id.
    pub entity_references: Vec<String>,
    pub verified: bool,
    pub verification_count: u32,
    /// Failed persistence attempts so far.
    pub persist_attempts: u32,
    pub last_error: Option<String>,
}

impl Finding {
    pub(crate) fn new(
        content: &str,
        source: &str,
        confidence: f64,
        query_context: &str,
        entity_references: &[String],
        now: DateTime<Utc>,
    ) -> Self {
        let entity_references = normalize_entities(entity_references);
        Self {
            id: generate_id(content, &entity_references),
            content: content.trim().to_string(),
            source: source.to_string(),
            sources: BTreeSet::from([source.to_string()]),
            confidence,
            max_confidence: confidence,
            timestamp: now,
            last_seen: now,
            query_context: query_context.to_string(),
            entity_references,
            verified: false,
            verification_count: 1,
            persist_attempts: 0,
            last_error: None,
        }
    }

    /// Record an equivalent resubmission.
    pub(crate) fn reinforce(&mut self, source: &str, confidence: f64, now: DateTime<Utc>) {
        self.verification_count = self.verification_count.saturating_add(1);
        self.source = source.to_string();
        self.sources.insert(source.to_string());
        self.confidence = confidence;
        self.max_confidence = self.max_confidence.max(confidence);
        self.last_seen = now;
    }

    /// Mark verified once the count reaches `threshold`. Never un-verifies.
    ///
    /// Returns `true` on the transition.
    pub(crate) fn apply_threshold(&mut self, threshold: u32) -> bool {
        if !self.verified && self.verification_count >= threshold {
            self.verified = true;
            return true;
        }
        false
    }

    /// Number of distinct sources.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn state(&self) -> FindingState {
        if self.verified {
            FindingState::Verified
        } else {
            FindingState::Unverified
        }
    }

    /// Document submitted to the knowledge graph.
    pub fn to_document(&self) -> GraphDocument {
        let mut document = GraphDocument::new(&self.id, &self.content)
            .with_confidence(self.confidence);
        document.sources = self.sources.iter().cloned().collect();
        document.entities = self.entity_references.clone();
        document.observed_at = self.timestamp;
        if !self.query_context.is_empty() {
            document = document.with_query_context(&self.query_context);
        }
        document
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const NO_ENTITIES: &[&str] = &[];

    #[test]
    fn test_generate_id_is_deterministic() {
        let a = generate_id("Product X supports refunds", &["product_x"]);
        let b = generate_id("Product X supports refunds", &["product_x"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), ID_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_id_ignores_entity_order_and_duplicates() {
        let a = generate_id("fact", &["b", "a"]);
        let b = generate_id("fact", &["a", "b", "a"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_generate_id_normalizes_case_and_whitespace() {
        let a = generate_id("Product X  supports\trefunds", &[" Product_X "]);
        let b = generate_id("  product x supports refunds ", &["product_x"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_generate_id_distinguishes_content_and_entities() {
        let base = generate_id("fact one", NO_ENTITIES);
        assert_ne!(base, generate_id("fact two", NO_ENTITIES));
        assert_ne!(base, generate_id("fact one", &["e"]));
    }

    #[test]
    fn test_separator_prevents_boundary_collisions() {
        // Content and entity text must not be able to shift across the boundary.
        assert_ne!(generate_id("a b", &["c"]), generate_id("a", &["b c"]));
        assert_ne!(generate_id("x", &["ab"]), generate_id("x", &["a", "b"]));
    }

    #[test]
    fn test_normalize_entities() {
        let entities = normalize_entities(&["  Beta", "alpha", "", "ALPHA", "   "]);
        assert_eq!(entities, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_normalize_content() {
        assert_eq!(normalize_content("  Hello\n\n  WORLD  "), "hello world");
        assert_eq!(normalize_content("   "), "");
    }

    #[test]
    fn test_reinforce_keeps_creation_fields() {
        let created = Utc::now();
        let mut finding = Finding::new(
            " Product X supports refunds ",
            "doc_1",
            0.85,
            "refund policy?",
            &["Product_X".to_string()],
            created,
        );
        assert_eq!(finding.content, "Product X supports refunds");
        assert_eq!(finding.entity_references, vec!["product_x"]);

        let later = created + chrono::Duration::seconds(5);
        finding.reinforce("doc_2", 0.9, later);

        assert_eq!(finding.verification_count, 2);
        assert_eq!(finding.source, "doc_2");
        assert_eq!(finding.source_count(), 2);
        assert_eq!(finding.confidence, 0.9);
        assert_eq!(finding.max_confidence, 0.9);
        assert_eq!(finding.timestamp, created);
        assert_eq!(finding.last_seen, later);
        assert_eq!(finding.query_context, "refund policy?");
    }

    #[test]
    fn test_apply_threshold_is_monotonic() {
        let mut finding = Finding::new("fact", "s", 0.9, "", &[], Utc::now());
        assert!(!finding.apply_threshold(2));
        assert_eq!(finding.state(), FindingState::Unverified);

        finding.reinforce("s", 0.9, Utc::now());
        assert!(finding.apply_threshold(2));
        assert!(!finding.apply_threshold(2));
        assert_eq!(finding.state(), FindingState::Verified);

        // A higher threshold later never reverts the flag.
        assert!(!finding.apply_threshold(10));
        assert!(finding.verified);
    }

    #[test]
    fn test_to_document() {
        let mut finding = Finding::new("fact", "doc_1", 0.85, "q", &["e".to_string()], Utc::now());
        finding.reinforce("doc_2", 0.9, Utc::now());

        let doc = finding.to_document();
        assert_eq!(doc.id, finding.id);
        assert_eq!(doc.content, "fact");
        assert_eq!(doc.sources, vec!["doc_1", "doc_2"]);
        assert_eq!(doc.entities, vec!["e"]);
        assert_eq!(doc.query_context.as_deref(), Some("q"));
        assert_eq!(doc.observed_at, finding.timestamp);
    }
}
