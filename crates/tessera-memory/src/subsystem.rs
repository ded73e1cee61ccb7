//! The gated knowledge-graph subsystem and its diagnostics.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_config::GraphConfig;
use tessera_graph::{GraphStore, KnowledgeGraph, SharedKnowledgeGraph};

use crate::feedback::{FeedbackLoop, FeedbackStats};
use crate::gate::{GateStatus, LazyGate};

/// Name the knowledge-graph gate reports in diagnostics and logs.
pub const GRAPH_SUBSYSTEM: &str = "knowledge_graph";

/// Lazy gate around the knowledge-graph client.
pub type GraphGate = LazyGate<dyn KnowledgeGraph>;

impl GraphGate {
    /// Gate that opens a [`GraphStore`] on first use.
    ///
    /// The capability flag comes from `graph.enabled`; a disabled graph is
    /// reported unavailable without ever opening the store.
    pub fn from_config(config: &GraphConfig) -> Self {
        let path = config.path.clone();
        LazyGate::new(GRAPH_SUBSYSTEM, config.enabled, move || {
            let path = path.clone();
            async move {
                let store = tokio::task::spawn_blocking(move || match path {
                    Some(path) => GraphStore::open(path),
                    None => GraphStore::open_in_memory(),
                })
                .await
                .map_err(|e| format!("graph loader task failed: {}", e))?
                .map_err(|e| e.to_string())?;

                store.initialize().await.map_err(|e| e.to_string())?;
                Ok::<SharedKnowledgeGraph, String>(Arc::new(store))
            }
        })
        .with_load_timeout(config.load_timeout())
    }

    /// Gate that resolves to an already constructed client.
    pub fn with_client(client: SharedKnowledgeGraph) -> Self {
        LazyGate::new(GRAPH_SUBSYSTEM, true, move || {
            let client = Arc::clone(&client);
            async move { Ok::<SharedKnowledgeGraph, String>(client) }
        })
    }
}

/// Combined gate and feedback-loop status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub graph: GateStatus,
    pub feedback: FeedbackStats,
    pub generated_at: DateTime<Utc>,
}

/// Snapshot both halves of the system. Never loads the graph.
pub fn collect_diagnostics(gate: &GraphGate, feedback: &FeedbackLoop) -> Diagnostics {
    Diagnostics {
        graph: gate.get_status(),
        feedback: feedback.get_statistics(),
        generated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tessera_graph::MockKnowledgeGraph;

    #[tokio::test]
    async fn test_disabled_graph_is_unavailable() {
        let config = GraphConfig {
            enabled: false,
            ..Default::default()
        };
        let gate = GraphGate::from_config(&config);

        assert!(!gate.is_available());
        assert!(gate.get_client().await.is_none());
        assert_eq!(gate.get_status().load_count, 0);
    }

    #[tokio::test]
    #[serial]
    async fn test_in_memory_graph_loads() {
        let gate = GraphGate::from_config(&GraphConfig::default());

        let client = gate.get_client().await.unwrap();
        assert_eq!(client.name(), "graphqlite");
        assert_eq!(gate.get_status().available, Some(true));
    }

    #[tokio::test]
    async fn test_with_client_returns_same_instance() {
        let mock = Arc::new(MockKnowledgeGraph::new());
        let gate = GraphGate::with_client(mock.clone());

        let client = gate.get_client().await.unwrap();
        assert_eq!(client.name(), "mock");
        assert!(Arc::ptr_eq(
            &client,
            &(mock as SharedKnowledgeGraph)
        ));
    }

    #[tokio::test]
    async fn test_diagnostics_do_not_load() {
        let gate = GraphGate::with_client(Arc::new(MockKnowledgeGraph::new()));
        let feedback = FeedbackLoop::default();
        feedback.add_finding("fact", "doc_1", 0.9, "q", &[]);

        let diagnostics = collect_diagnostics(&gate, &feedback);
        assert_eq!(diagnostics.graph.available, None);
        assert_eq!(diagnostics.graph.load_count, 0);
        assert_eq!(diagnostics.feedback.pending_count, 1);

        let json = serde_json::to_value(&diagnostics).unwrap();
        assert_eq!(json["graph"]["name"], GRAPH_SUBSYSTEM);
        assert!(json["graph"]["available"].is_null());
        assert_eq!(json["feedback"]["findings_received"], 1);
    }
}
