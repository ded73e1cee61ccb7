//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use tempfile::TempDir;
use tessera_config::GraphConfig;
use tessera_graph::{MockKnowledgeGraph, SharedKnowledgeGraph};
use tessera_memory::{FeedbackLoop, FeedbackSettings, GraphGate};
use tessera_server::{AppState, Server, ServerConfig};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// A test server that runs in the background.
pub struct TestServer {
    /// The server's address.
    pub addr: SocketAddr,
    /// The auth token for the server.
    pub token: String,
    /// HTTP client configured for this server.
    pub client: Client,
    /// Shared state, for asserting on the gate and loop directly.
    pub state: AppState,
    /// Handle to the server task.
    _handle: JoinHandle<()>,
    /// Temporary directory for test data.
    pub temp_dir: TempDir,
}

impl TestServer {
    /// Start a server whose graph is the given mock.
    pub async fn with_mock(mock: Arc<MockKnowledgeGraph>) -> Result<Self> {
        let gate = GraphGate::with_client(mock as SharedKnowledgeGraph);
        Self::start_with(gate, FeedbackSettings::default()).await
    }

    /// Start a server whose graph fails to load.
    pub async fn with_broken_graph() -> Result<Self> {
        let gate = GraphGate::new("knowledge_graph", true, || async {
            Err::<SharedKnowledgeGraph, _>("graph library missing")
        });
        Self::start_with(gate, FeedbackSettings::default()).await
    }

    /// Start a server backed by a graphqlite file in a temp directory.
    pub async fn with_graph_store() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let config = GraphConfig {
            path: Some(temp_dir.path().join("graph.db")),
            ..Default::default()
        };
        let gate = GraphGate::from_config(&config);
        Self::start_in(temp_dir, gate, FeedbackSettings::default()).await
    }

    /// Start a server with an explicit gate and loop settings.
    pub async fn start_with(gate: GraphGate, settings: FeedbackSettings) -> Result<Self> {
        Self::start_in(TempDir::new()?, gate, settings).await
    }

    async fn start_in(temp_dir: TempDir, gate: GraphGate, settings: FeedbackSettings) -> Result<Self> {
        let token = "test-token".to_string();
        let addr = find_available_port().await?;

        let config = ServerConfig::new(Some(token.clone()))
            .with_bind_address(addr)
            .with_rate_limiting(false)
            .with_request_logging(false);

        let state = AppState::new(config, Arc::new(gate), Arc::new(FeedbackLoop::new(settings)));

        let server = Server::from_state(state.clone());
        let handle = tokio::spawn(async move {
            let _ = server.run_on(addr).await;
        });

        let client = Client::new();
        wait_for_server(&client, addr).await?;

        Ok(Self {
            addr,
            token,
            client,
            state,
            _handle: handle,
            temp_dir,
        })
    }

    /// Get the base URL for the server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get an authenticated GET request builder.
    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url(), path))
            .bearer_auth(&self.token)
    }

    /// Get an authenticated POST request builder.
    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url(), path))
            .bearer_auth(&self.token)
    }

    /// Submit a finding and return the response body.
    pub async fn submit(
        &self,
        content: &str,
        source: &str,
        confidence: f64,
    ) -> Result<serde_json::Value> {
        let resp = self
            .post("/api/v1/findings")
            .json(&serde_json::json!({
                "content": content,
                "source": source,
                "confidence": confidence,
                "query_context": "integration test",
            }))
            .send()
            .await?;
        anyhow::ensure!(resp.status().is_success(), "submit failed: {}", resp.status());
        Ok(resp.json().await?)
    }

    /// Check if server is healthy.
    pub async fn health(&self) -> Result<bool> {
        let resp = self
            .client
            .get(format!("{}/health", self.base_url()))
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    /// Fetch diagnostics.
    pub async fn diagnostics(&self) -> Result<serde_json::Value> {
        Ok(self.get("/api/v1/diagnostics").send().await?.json().await?)
    }
}

/// Find an available port for the test server.
async fn find_available_port() -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

/// Wait for the server to become ready.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/health", addr);

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return,
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(_) => anyhow::bail!("Timeout waiting for server to start"),
    }
}
