//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [server]     # HTTP listener, auth, rate limiting
//! [feedback]   # admission, verification, retention
//! [graph]      # knowledge-graph subsystem
//! [logging]    # log file location
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default bind address.
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Default API requests per minute.
pub const DEFAULT_API_RPM: u32 = 120;

/// Minimum confidence for a finding to be admitted.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Corroborating submissions required before a finding is verified.
pub const DEFAULT_VERIFICATION_THRESHOLD: u32 = 2;

/// Upper bound on the number of pending findings.
pub const DEFAULT_MAX_PENDING: usize = 10_000;

/// Age after which an unpersisted finding is evicted (24 hours).
pub const DEFAULT_PENDING_TTL_SECS: u64 = 86_400;

/// Budget for a single knowledge-graph persistence call.
pub const DEFAULT_PERSIST_TIMEOUT_SECS: u64 = 30;

/// Budget for loading the knowledge-graph subsystem.
pub const DEFAULT_LOAD_TIMEOUT_SECS: u64 = 60;

/// Dataset that verified findings are written into.
pub const DEFAULT_DATASET_NAME: &str = "feedback";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseraConfig {
    /// Server configuration.
    pub server: Option<ServerConfig>,

    /// Feedback loop configuration.
    pub feedback: Option<FeedbackConfig>,

    /// Knowledge-graph subsystem configuration.
    pub graph: Option<GraphConfig>,

    /// Logging configuration.
    pub logging: Option<LoggingConfig>,
}

impl TesseraConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: TesseraConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: TesseraConfig) {
        if other.server.is_some() {
            self.server = other.server;
        }

        if other.feedback.is_some() {
            self.feedback = other.feedback;
        }

        if other.graph.is_some() {
            self.graph = other.graph;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Server section, falling back to defaults.
    pub fn server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    /// Feedback section, falling back to defaults.
    pub fn feedback(&self) -> FeedbackConfig {
        self.feedback.clone().unwrap_or_default()
    }

    /// Graph section, falling back to defaults.
    pub fn graph(&self) -> GraphConfig {
        self.graph.clone().unwrap_or_default()
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if let Some(ref feedback) = self.feedback {
            feedback.validate()?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// The `[server]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on.
    pub port: u16,
    /// Address to bind to.
    pub bind: String,
    /// Bearer token required on API routes. Prefer `TESSERA_API_TOKEN`.
    pub auth_token: Option<String>,
    /// Enable rate limiting.
    pub rate_limiting: bool,
    /// API rate limit: requests per minute.
    pub api_rpm: u32,
    /// Enable request logging.
    pub request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            auth_token: None,
            rate_limiting: true,
            api_rpm: DEFAULT_API_RPM,
            request_logging: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Feedback Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// The `[feedback]` section.
///
/// ```toml
/// [feedback]
/// confidence_threshold = 0.8
/// verification_threshold = 2
/// max_pending = 10000
/// pending_ttl_secs = 86400
/// sweep_interval_secs = 300
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Submissions below this confidence are rejected.
    pub confidence_threshold: f64,
    /// Equivalent submissions needed before a finding is verified.
    pub verification_threshold: u32,
    /// Maximum number of pending findings kept in memory.
    pub max_pending: usize,
    /// Pending findings older than this are evicted. 0 disables expiry.
    pub pending_ttl_secs: u64,
    /// Timeout for each persistence call into the knowledge graph.
    pub persist_timeout_secs: u64,
    /// Interval of the background sweep. 0 disables it.
    pub sweep_interval_secs: u64,
    /// Dataset that verified findings are written into.
    pub dataset_name: String,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            verification_threshold: DEFAULT_VERIFICATION_THRESHOLD,
            max_pending: DEFAULT_MAX_PENDING,
            pending_ttl_secs: DEFAULT_PENDING_TTL_SECS,
            persist_timeout_secs: DEFAULT_PERSIST_TIMEOUT_SECS,
            sweep_interval_secs: 0,
            dataset_name: DEFAULT_DATASET_NAME.to_string(),
        }
    }
}

impl FeedbackConfig {
    /// Pending TTL as a duration, `None` when expiry is disabled.
    pub fn pending_ttl(&self) -> Option<Duration> {
        (self.pending_ttl_secs > 0).then(|| Duration::from_secs(self.pending_ttl_secs))
    }

    /// Persistence timeout as a duration.
    pub fn persist_timeout(&self) -> Duration {
        Duration::from_secs(self.persist_timeout_secs)
    }

    /// Sweep interval as a duration, `None` when the sweeper is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "feedback.confidence_threshold".to_string(),
                reason: format!("{} is outside [0, 1]", self.confidence_threshold),
            });
        }
        if self.verification_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "feedback.verification_threshold".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_pending == 0 {
            return Err(ConfigError::InvalidValue {
                field: "feedback.max_pending".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.dataset_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "feedback.dataset_name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Graph Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// The `[graph]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Whether the knowledge-graph subsystem is enabled at all.
    pub enabled: bool,
    /// Graph database path. In-memory when unset.
    pub path: Option<PathBuf>,
    /// Timeout for the initial subsystem load.
    pub load_timeout_secs: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            load_timeout_secs: DEFAULT_LOAD_TIMEOUT_SECS,
        }
    }
}

impl GraphConfig {
    /// Load timeout as a duration.
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// The `[logging]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for rolling JSON log files. Defaults to `<config dir>/logs`.
    pub dir: Option<PathBuf>,
    /// Extra `EnvFilter` directives applied to console output.
    pub filter: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
