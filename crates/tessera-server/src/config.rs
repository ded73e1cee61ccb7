//! Server configuration.

use std::net::{IpAddr, SocketAddr};

use tessera_config::{DEFAULT_API_RPM, DEFAULT_PORT};

use crate::error::{Result, ServerError};

/// Default max body size for REST requests (1 MB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Maximum number of fragments accepted in one ingest request.
pub const DEFAULT_MAX_FRAGMENTS: usize = 256;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to.
    pub bind_address: SocketAddr,

    /// Authentication token. `None` means auth is disabled (localhost mode).
    pub auth_token: Option<String>,

    /// Enable rate limiting.
    pub rate_limiting: bool,

    /// Rate limit: requests per minute for API endpoints.
    pub api_rpm: u32,

    /// Enable request logging.
    pub request_logging: bool,

    /// Maximum REST request body size in bytes.
    pub max_body_size: usize,

    /// Maximum fragments per ingest request.
    pub max_fragments: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            auth_token: None,
            rate_limiting: true,
            api_rpm: DEFAULT_API_RPM,
            request_logging: true,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            max_fragments: DEFAULT_MAX_FRAGMENTS,
        }
    }
}

impl ServerConfig {
    /// Create a new server config with an optional auth token.
    /// Pass `None` to disable authentication (localhost mode).
    pub fn new(auth_token: Option<String>) -> Self {
        Self {
            auth_token,
            ..Default::default()
        }
    }

    /// Build from the `[server]` section of the config file.
    pub fn from_config(config: &tessera_config::ServerConfig) -> Result<Self> {
        let ip: IpAddr = config.bind.parse().map_err(|_| {
            ServerError::Config(format!("invalid bind address '{}'", config.bind))
        })?;

        Ok(Self {
            bind_address: SocketAddr::new(ip, config.port),
            auth_token: config.auth_token.clone(),
            rate_limiting: config.rate_limiting,
            api_rpm: config.api_rpm,
            request_logging: config.request_logging,
            ..Default::default()
        })
    }

    /// Set the bind address.
    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    /// Enable or disable rate limiting.
    pub fn with_rate_limiting(mut self, enabled: bool) -> Self {
        self.rate_limiting = enabled;
        self
    }

    /// Set the API rate limit (requests per minute).
    pub fn with_api_rpm(mut self, rpm: u32) -> Self {
        self.api_rpm = rpm;
        self
    }

    /// Enable or disable request logging.
    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.request_logging = enabled;
        self
    }

    /// Set the maximum REST request body size.
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Set the maximum number of fragments per ingest request.
    pub fn with_max_fragments(mut self, max: usize) -> Self {
        self.max_fragments = max;
        self
    }
}
