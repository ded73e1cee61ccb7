//! Configuration system for the Tessera retrieval backend.
//!
//! Provides TOML-based configuration with:
//! - `[server]`, `[feedback]`, `[graph]`, `[logging]` sections, all optional
//! - Config file layering (user config + project-local overrides)
//! - Range validation for feedback thresholds

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, load_config, load_config_file, load_config_with_options,
    save_config, user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
