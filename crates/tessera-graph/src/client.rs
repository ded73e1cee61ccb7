//! Knowledge-graph client trait and mock implementation.
//!
//! Every backend implements [`KnowledgeGraph`]; callers hold it as a
//! [`SharedKnowledgeGraph`] so the lazily loaded client can be handed to many
//! tasks at once.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{GraphError, Result};
use crate::types::{GraphDocument, SearchResult, SearchType};

/// Async interface to the knowledge-graph subsystem.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so a single loaded client can be
/// shared by every request handler.
#[async_trait]
pub trait KnowledgeGraph: Send + Sync {
    /// Prepare the backend. Safe to call more than once.
    async fn initialize(&self) -> Result<()>;

    /// Stage a document for the next `cognify` pass.
    async fn add(&self, document: GraphDocument, dataset_name: &str) -> Result<()>;

    /// Build graph structure from everything staged so far.
    ///
    /// Expensive; never called inline on a user-facing request.
    async fn cognify(&self) -> Result<()>;

    /// Remove everything the backend holds.
    async fn reset(&self) -> Result<()>;

    /// Query the graph.
    async fn search(&self, query: &str, search_type: SearchType) -> Result<Vec<SearchResult>>;

    /// Backend name for diagnostics.
    fn name(&self) -> &str;
}

/// A knowledge-graph client that can be shared across tasks.
pub type SharedKnowledgeGraph = Arc<dyn KnowledgeGraph>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock
// ─────────────────────────────────────────────────────────────────────────────

/// A mock knowledge graph for testing.
///
/// Records every call, and can be told to fail `add` for specific document
/// ids or to stall each `add` for a fixed delay.
#[derive(Debug, Default)]
pub struct MockKnowledgeGraph {
    added: Mutex<Vec<(String, GraphDocument)>>,
    failing_ids: Mutex<HashSet<String>>,
    add_delay: Mutex<Option<Duration>>,
    fail_cognify: Mutex<bool>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl MockKnowledgeGraph {
    /// Create an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `add` fail for the given document id.
    pub fn fail_on(&self, document_id: impl Into<String>) {
        self.failing_ids.lock().insert(document_id.into());
    }

    /// Stop failing `add` for the given document id.
    pub fn recover(&self, document_id: &str) {
        self.failing_ids.lock().remove(document_id);
    }

    /// Delay every `add` call.
    pub fn set_add_delay(&self, delay: Duration) {
        *self.add_delay.lock() = Some(delay);
    }

    /// Make `cognify` fail.
    pub fn set_fail_cognify(&self, fail: bool) {
        *self.fail_cognify.lock() = fail;
    }

    /// Documents accepted by `add`, with their dataset.
    pub fn added(&self) -> Vec<(String, GraphDocument)> {
        self.added.lock().clone()
    }

    /// Ids of documents accepted by `add`.
    pub fn added_ids(&self) -> Vec<String> {
        self.added.lock().iter().map(|(_, d)| d.id.clone()).collect()
    }

    /// Number of times an operation was invoked.
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls.lock().get(operation).copied().unwrap_or(0)
    }

    fn record(&self, operation: &'static str) {
        *self.calls.lock().entry(operation).or_insert(0) += 1;
    }
}

#[async_trait]
impl KnowledgeGraph for MockKnowledgeGraph {
    async fn initialize(&self) -> Result<()> {
        self.record("initialize");
        Ok(())
    }

    async fn add(&self, document: GraphDocument, dataset_name: &str) -> Result<()> {
        self.record("add");

        let delay = *self.add_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing_ids.lock().contains(&document.id) {
            return Err(GraphError::Backend(format!(
                "MockKnowledgeGraph: rejected {}",
                document.id
            )));
        }

        self.added.lock().push((dataset_name.to_string(), document));
        Ok(())
    }

    async fn cognify(&self) -> Result<()> {
        self.record("cognify");
        if *self.fail_cognify.lock() {
            return Err(GraphError::Backend(
                "MockKnowledgeGraph: cognify failed".to_string(),
            ));
        }
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        self.record("reset");
        self.added.lock().clear();
        Ok(())
    }

    async fn search(&self, query: &str, search_type: SearchType) -> Result<Vec<SearchResult>> {
        self.record("search");
        let needle = query.to_lowercase();
        let results = self
            .added
            .lock()
            .iter()
            .filter(|(_, doc)| match search_type {
                SearchType::Chunks => doc.content.to_lowercase().contains(&needle),
                SearchType::Insights => doc.entities.iter().any(|e| e.to_lowercase() == needle),
            })
            .map(|(dataset, doc)| SearchResult {
                id: doc.id.clone(),
                dataset: dataset.clone(),
                content: doc.content.clone(),
                score: 1.0,
                entities: doc.entities.clone(),
                sources: doc.sources.clone(),
            })
            .collect();
        Ok(results)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
