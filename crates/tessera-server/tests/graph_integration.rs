//! Tests against a real graphqlite-backed knowledge graph.

mod common;

use anyhow::Result;
use common::TestServer;
use serde_json::{Value, json};

#[tokio::test]
async fn test_verified_findings_reach_graph_store() -> Result<()> {
    let server = TestServer::with_graph_store().await?;

    for source in ["doc_1", "doc_2"] {
        let resp = server
            .post("/api/v1/findings")
            .json(&json!({
                "content": "Product X supports refunds",
                "source": source,
                "confidence": 0.9,
                "entity_references": ["product_x"],
            }))
            .send()
            .await?;
        assert!(resp.status().is_success());
    }

    // Nothing has needed the graph yet.
    let diagnostics = server.diagnostics().await?;
    assert!(diagnostics["graph"]["available"].is_null());

    let process: Value = server
        .post("/api/v1/admin/process")
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(process["persisted"], 1);

    let chunks: Value = server
        .post("/api/v1/graph/search")
        .json(&json!({"query": "refunds"}))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(chunks["count"], 1);
    assert_eq!(chunks["results"][0]["sources"], json!(["doc_1", "doc_2"]));

    let insights: Value = server
        .post("/api/v1/graph/search")
        .json(&json!({"query": "product_x", "search_type": "insights"}))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(insights["count"], 1);

    assert!(server.temp_dir.path().join("graph.db").exists());
    Ok(())
}
