//! Tessera - retrieval feedback loop and lazy knowledge-graph gate
//!
//! Main entry point for the Tessera CLI.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tessera_config::{LoadedConfig, LoggingConfig, ServerConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod client;
mod commands;

use commands::{config, start, status};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Tessera - retrieval feedback loop and lazy knowledge-graph gate
#[derive(Parser)]
#[command(name = "tessera")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Server URL (default: derived from the [server] config section)
    #[arg(long, global = true, env = "TESSERA_SERVER_URL")]
    pub server: Option<String>,

    /// Load this config file instead of discovering user and project files
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the Tessera server
    Start(start::StartArgs),

    /// Show server status, gate state and feedback counters
    Status(status::StatusArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = match cli.config.as_deref() {
        Some(path) => LoadedConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => tessera_config::load_config(None)?,
    };

    let _guard = init_tracing(cli.verbose, loaded.config.logging.as_ref());

    let server_url = cli
        .server
        .unwrap_or_else(|| default_server_url(&loaded.config.server()));

    let ctx = commands::Context {
        server_url,
        json_output: cli.json,
        verbose: cli.verbose,
        loaded,
    };

    match cli.command {
        Commands::Start(args) => start::run(args, &ctx).await,
        Commands::Status(args) => status::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}

/// Install the console layer and the rolling JSON file layer.
///
/// The returned guard flushes the file writer on drop and must outlive
/// every command.
fn init_tracing(verbose: bool, logging: Option<&LoggingConfig>) -> WorkerGuard {
    let default_filter = if verbose {
        "tessera=debug,tessera_memory=debug,tessera_graph=debug,tessera_server=debug,tessera_config=debug,info"
    } else {
        "tessera=info,tessera_memory=info,tessera_server=info,warn"
    };

    let console_filter = match logging.and_then(|l| l.filter.as_deref()) {
        Some(extra) => EnvFilter::try_new(format!("{},{}", default_filter, extra))
            .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        None => EnvFilter::new(default_filter),
    };

    let log_dir = log_dir(logging.and_then(|l| l.dir.as_deref()));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "tessera.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(
                    "tessera=trace,tessera_memory=trace,tessera_graph=trace,tessera_server=trace,tessera_config=trace,info",
                )),
        )
        .init();

    guard
}

fn log_dir(configured: Option<&Path>) -> PathBuf {
    configured.map(Path::to_path_buf).unwrap_or_else(|| {
        tessera_config::user_config_dir()
            .map(|d| d.join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"))
    })
}

/// URL clients use to reach a server started with `config`.
fn default_server_url(config: &ServerConfig) -> String {
    let host = match config.bind.as_str() {
        "0.0.0.0" | "::" => "127.0.0.1",
        other => other,
    };
    if host.contains(':') {
        format!("http://[{}]:{}", host, config.port)
    } else {
        format!("http://{}:{}", host, config.port)
    }
}
