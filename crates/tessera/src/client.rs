//! HTTP client for talking to a running Tessera server.

use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use serde::{Deserialize, Serialize};

/// Health check response from the server.
#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// `available`, `unavailable` or `unknown`.
    #[serde(default)]
    pub graph: String,
}

/// Gate status as reported by the diagnostics endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct GateStatus {
    pub name: String,
    pub available: Option<bool>,
    pub client_loaded: bool,
    pub last_error: Option<String>,
    pub load_attempted_at: Option<String>,
    #[serde(default)]
    pub load_count: u64,
}

/// Feedback-loop counters as reported by the diagnostics endpoint.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackStats {
    pub findings_received: u64,
    pub findings_persisted: u64,
    pub findings_deduplicated: u64,
    pub findings_rejected: u64,
    pub findings_evicted: u64,
    pub persist_failures: u64,
    pub pending_count: usize,
    pub verified_count: usize,
}

/// Diagnostics response.
#[derive(Debug, Serialize, Deserialize)]
pub struct Diagnostics {
    pub graph: GateStatus,
    pub feedback: FeedbackStats,
    pub generated_at: String,
}

/// Client for the Tessera HTTP API.
pub struct Client {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl Client {
    /// Create a client for `base_url`, optionally sending a bearer token.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            http,
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.http.get(format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// `GET /health`.
    pub async fn health(&self) -> Result<HealthResponse> {
        let resp = self.get("/health").send().await?;
        if !resp.status().is_success() {
            bail!("health check failed: {}", resp.status());
        }
        Ok(resp.json().await?)
    }

    /// `GET /api/v1/diagnostics`.
    pub async fn diagnostics(&self) -> Result<Diagnostics> {
        let resp = self.get("/api/v1/diagnostics").send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("diagnostics request failed ({}): {}", status, body);
        }
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let client = Client::new("http://localhost:8080/", None).unwrap();
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_diagnostics_deserialize() {
        let json = r#"{
            "graph": {
                "name": "knowledge_graph",
                "available": null,
                "client_loaded": false,
                "last_error": null,
                "load_attempted_at": null,
                "load_count": 0
            },
            "feedback": {"findings_received": 3, "pending_count": 1},
            "generated_at": "2026-01-01T00:00:00Z"
        }"#;

        let diagnostics: Diagnostics = serde_json::from_str(json).unwrap();
        assert!(diagnostics.graph.available.is_none());
        assert_eq!(diagnostics.feedback.findings_received, 3);
        assert_eq!(diagnostics.feedback.persist_failures, 0);
    }
}
