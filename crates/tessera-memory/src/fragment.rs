//! Scored fragments handed over by the retrieval path.

use serde::{Deserialize, Serialize};

/// Source recorded for fragments that carry no document id.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// A retrieved text fragment with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredFragment {
    pub text: String,
    pub score: f64,
    #[serde(default)]
    pub metadata: FragmentMetadata,
}

/// Metadata attached to a fragment by the retrieval index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    #[serde(default)]
    pub entities: Vec<String>,
    /// Anything else the index attached.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ScoredFragment {
    pub fn new(text: impl Into<String>, score: f64) -> Self {
        Self {
            text: text.into(),
            score,
            metadata: FragmentMetadata::default(),
        }
    }

    pub fn with_doc_id(mut self, doc_id: impl Into<String>) -> Self {
        self.metadata.doc_id = Some(doc_id.into());
        self
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.metadata.entities.push(entity.into());
        self
    }

    /// Source to record for the finding, falling back to [`UNKNOWN_SOURCE`].
    pub fn source(&self) -> &str {
        match self.metadata.doc_id.as_deref() {
            Some(id) if !id.trim().is_empty() => id,
            _ => UNKNOWN_SOURCE,
        }
    }

    /// Score clamped to `[0, 1]`. NaN stays NaN so admission rejects it.
    pub fn confidence(&self) -> f64 {
        self.score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_fallback() {
        assert_eq!(ScoredFragment::new("t", 0.9).source(), UNKNOWN_SOURCE);
        assert_eq!(
            ScoredFragment::new("t", 0.9).with_doc_id("  ").source(),
            UNKNOWN_SOURCE
        );
        assert_eq!(
            ScoredFragment::new("t", 0.9).with_doc_id("doc_1").source(),
            "doc_1"
        );
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(ScoredFragment::new("t", 1.7).confidence(), 1.0);
        assert_eq!(ScoredFragment::new("t", -0.2).confidence(), 0.0);
        assert_eq!(ScoredFragment::new("t", 0.85).confidence(), 0.85);
        assert!(ScoredFragment::new("t", f64::NAN).confidence().is_nan());
    }

    #[test]
    fn test_deserialize_keeps_extra_metadata() {
        let json = r#"{
            "text": "Product X supports refunds",
            "score": 0.91,
            "metadata": {"doc_id": "doc_1", "entities": ["product_x"], "page": 4}
        }"#;
        let fragment: ScoredFragment = serde_json::from_str(json).unwrap();

        assert_eq!(fragment.source(), "doc_1");
        assert_eq!(fragment.metadata.entities, vec!["product_x"]);
        assert_eq!(fragment.metadata.extra["page"], 4);
    }

    #[test]
    fn test_deserialize_without_metadata() {
        let fragment: ScoredFragment =
            serde_json::from_str(r#"{"text": "t", "score": 0.5}"#).unwrap();
        assert!(fragment.metadata.doc_id.is_none());
        assert!(fragment.metadata.entities.is_empty());
    }
}
