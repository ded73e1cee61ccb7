//! Knowledge graph storage using graphqlite.
//!
//! `add` only stages documents. `cognify` turns staged documents into
//! `Finding`, `Source`, `Entity` and `Dataset` nodes joined by `CITED_IN`,
//! `MENTIONS` and `PART_OF` relationships, and indexes them for `search`.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use graphqlite::Graph;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::client::KnowledgeGraph;
use crate::error::{GraphError, Result};
use crate::types::{GraphDocument, GraphStats, RelationshipType, SearchResult, SearchType};

/// A document that has been cognified, with the dataset it belongs to.
#[derive(Debug, Clone)]
struct IndexedDocument {
    dataset: String,
    document: GraphDocument,
}

struct Inner {
    graph: Graph,
    initialized: bool,
    staged: Vec<(String, GraphDocument)>,
    documents: HashMap<String, IndexedDocument>,
    node_ids: BTreeSet<String>,
}

/// Knowledge graph backed by graphqlite.
///
/// The underlying connection is not `Sync`, so every operation runs under a
/// single mutex. SQLite calls block, so trait operations take the lock on the
/// blocking pool and the calling task stays cancellable. A cancelled
/// operation still runs to completion in the background.
pub struct GraphStore {
    inner: Arc<Mutex<Inner>>,
}

impl GraphStore {
    /// Open or create a graph store at the given path.
    ///
    /// Blocking: run it on a blocking thread when called from async code.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let graph = Graph::open(&path_str).map_err(|e| GraphError::Open(e.to_string()))?;

        info!("Graph store opened at {:?}", path.as_ref());
        Ok(Self::from_graph(graph))
    }

    /// Create an in-memory graph store.
    pub fn open_in_memory() -> Result<Self> {
        let graph = Graph::open(":memory:").map_err(|e| GraphError::Open(e.to_string()))?;

        info!("In-memory graph store created");
        Ok(Self::from_graph(graph))
    }

    fn from_graph(graph: Graph) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                graph,
                initialized: false,
                staged: Vec::new(),
                documents: HashMap::new(),
                node_ids: BTreeSet::new(),
            })),
        }
    }

    /// Run `op` with the store locked, on the blocking pool.
    async fn with_inner<R, F>(&self, op: F) -> Result<R>
    where
        F: FnOnce(&mut Inner) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&mut *inner.lock()))
            .await
            .map_err(|e| GraphError::Backend(format!("graph task failed: {}", e)))?
    }

    /// Get graph statistics.
    ///
    /// Blocking: waits for any operation in progress.
    pub fn stats(&self) -> Result<GraphStats> {
        let inner = self.inner.lock();
        let stats = inner
            .graph
            .stats()
            .map_err(|e| GraphError::Query(e.to_string()))?;

        Ok(GraphStats {
            node_count: stats.node_count as usize,
            relationship_count: stats.edge_count as usize,
            staged_count: inner.staged.len(),
        })
    }
}

impl Inner {
    fn upsert_node(&mut self, id: &str, label: &str, props: Vec<(&str, &str)>) -> Result<()> {
        self.graph
            .upsert_node(id, props, label)
            .map_err(|e| GraphError::Query(e.to_string()))?;
        self.node_ids.insert(id.to_string());
        Ok(())
    }

    fn upsert_edge(&self, from: &str, to: &str, rel: RelationshipType) -> Result<()> {
        self.graph
            .upsert_edge(from, to, Vec::<(&str, &str)>::new(), rel.as_str())
            .map_err(|e| GraphError::Query(e.to_string()))?;
        debug!("Added relationship {} -[{}]-> {}", from, rel.as_str(), to);
        Ok(())
    }

    fn write_document(&mut self, dataset: &str, doc: &GraphDocument) -> Result<()> {
        let finding_node = format!("finding:{}", doc.id);
        let dataset_node = format!("dataset:{}", dataset);
        let confidence = doc.confidence.to_string();
        let observed_at = doc.observed_at.to_rfc3339();

        let mut props = vec![
            ("content", doc.content.as_str()),
            ("confidence", confidence.as_str()),
            ("observed_at", observed_at.as_str()),
        ];
        if let Some(ref query) = doc.query_context {
            props.push(("query_context", query.as_str()));
        }
        self.upsert_node(&finding_node, "Finding", props)?;

        self.upsert_node(&dataset_node, "Dataset", vec![("name", dataset)])?;
        self.upsert_edge(&finding_node, &dataset_node, RelationshipType::PartOf)?;

        for source in &doc.sources {
            let source_node = format!("source:{}", source);
            self.upsert_node(&source_node, "Source", vec![("name", source.as_str())])?;
            self.upsert_edge(&finding_node, &source_node, RelationshipType::CitedIn)?;
        }

        for entity in &doc.entities {
            let entity_node = format!("entity:{}", entity);
            self.upsert_node(&entity_node, "Entity", vec![("name", entity.as_str())])?;
            self.upsert_edge(&finding_node, &entity_node, RelationshipType::Mentions)?;
        }

        self.documents.insert(
            doc.id.clone(),
            IndexedDocument {
                dataset: dataset.to_string(),
                document: doc.clone(),
            },
        );
        Ok(())
    }
}

/// Lowercased, whitespace-split query terms.
fn query_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect()
}

fn to_result(indexed: &IndexedDocument, score: f32, entities: Vec<String>) -> SearchResult {
    SearchResult {
        id: indexed.document.id.clone(),
        dataset: indexed.dataset.clone(),
        content: indexed.document.content.clone(),
        score,
        entities,
        sources: indexed.document.sources.clone(),
    }
}

impl Inner {
    fn cognify(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(GraphError::NotInitialized);
        }

        let staged = std::mem::take(&mut self.staged);
        let total = staged.len();
        let mut remaining = Vec::new();
        let mut first_error = None;

        for (dataset, doc) in staged {
            if let Err(e) = self.write_document(&dataset, &doc) {
                first_error.get_or_insert(e);
                remaining.push((dataset, doc));
            }
        }

        let written = total - remaining.len();
        self.staged = remaining;
        info!(written, failed = self.staged.len(), "Cognify pass complete");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn reset(&mut self) -> Result<()> {
        let node_ids = std::mem::take(&mut self.node_ids);
        for id in &node_ids {
            self.graph
                .delete_node(id)
                .map_err(|e| GraphError::Query(e.to_string()))?;
        }
        self.staged.clear();
        self.documents.clear();
        info!(deleted = node_ids.len(), "Graph store reset");
        Ok(())
    }

    fn search(&self, terms: &[String], search_type: SearchType) -> Vec<SearchResult> {
        let mut results: Vec<SearchResult> = match search_type {
            SearchType::Chunks => self
                .documents
                .values()
                .filter_map(|indexed| {
                    let content = indexed.document.content.to_lowercase();
                    let matched = terms.iter().filter(|t| content.contains(t.as_str())).count();
                    (matched > 0).then(|| {
                        to_result(
                            indexed,
                            matched as f32 / terms.len() as f32,
                            indexed.document.entities.clone(),
                        )
                    })
                })
                .collect(),
            SearchType::Insights => self
                .documents
                .values()
                .filter_map(|indexed| {
                    let matched: Vec<String> = indexed
                        .document
                        .entities
                        .iter()
                        .filter(|e| {
                            let entity = e.to_lowercase();
                            terms.iter().any(|t| entity.contains(t.as_str()))
                        })
                        .cloned()
                        .collect();
                    (!matched.is_empty()).then(|| {
                        let score = matched.len() as f32 / indexed.document.entities.len() as f32;
                        to_result(indexed, score, matched)
                    })
                })
                .collect(),
        };

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results
    }
}

#[async_trait]
impl KnowledgeGraph for GraphStore {
    async fn initialize(&self) -> Result<()> {
        self.with_inner(|inner| {
            if !inner.initialized {
                inner.initialized = true;
                debug!("Graph store initialized");
            }
            Ok(())
        })
        .await
    }

    async fn add(&self, document: GraphDocument, dataset_name: &str) -> Result<()> {
        if document.content.trim().is_empty() {
            return Err(GraphError::InvalidData(format!(
                "document {} has empty content",
                document.id
            )));
        }

        let dataset = dataset_name.to_string();
        self.with_inner(move |inner| {
            if !inner.initialized {
                return Err(GraphError::NotInitialized);
            }
            debug!(document_id = %document.id, dataset = %dataset, "Staged document");
            inner.staged.push((dataset, document));
            Ok(())
        })
        .await
    }

    async fn cognify(&self) -> Result<()> {
        self.with_inner(Inner::cognify).await
    }

    async fn reset(&self) -> Result<()> {
        self.with_inner(Inner::reset).await
    }

    async fn search(&self, query: &str, search_type: SearchType) -> Result<Vec<SearchResult>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        self.with_inner(move |inner| Ok(inner.search(&terms, search_type)))
            .await
    }

    fn name(&self) -> &str {
        "graphqlite"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
