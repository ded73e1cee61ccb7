//! Start command - launches the Tessera server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tessera_memory::{Availability, FeedbackLoop, GraphGate, run_sweep, spawn_sweeper};
use tessera_server::{Server, ServerConfig};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::Context;

/// Arguments for the start command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// API token for authentication (or set TESSERA_API_TOKEN env var)
    #[arg(long, env = "TESSERA_API_TOKEN")]
    pub token: Option<String>,

    /// Background sweep interval in seconds, 0 to disable (overrides config)
    #[arg(long, value_name = "SECS")]
    pub sweep_interval: Option<u64>,
}

/// Run the start command.
pub async fn run(args: StartArgs, ctx: &Context) -> Result<()> {
    let loaded = &ctx.loaded;

    for warning in &loaded.warnings {
        eprintln!("warning: {}", warning);
    }

    if ctx.verbose {
        let sources = loaded.loaded_from();
        if sources.is_empty() {
            println!("No config files found, using defaults + CLI args");
        } else {
            for source in sources {
                println!("Loaded config: {}", source.display());
            }
        }
    }

    // ── Server settings ─────────────────────────────────────────────────

    let mut server_section = loaded.config.server();
    if let Some(port) = args.port {
        server_section.port = port;
    }
    if let Some(bind) = args.bind {
        server_section.bind = bind;
    }
    if args.token.is_some() {
        server_section.auth_token = args.token;
    }
    let server_config = ServerConfig::from_config(&server_section)?;

    println!("Bind address: {}", server_config.bind_address);
    match &server_config.auth_token {
        Some(t) => println!("Auth token: {}...", token_preview(t)),
        None => println!("Auth: disabled"),
    }

    // ── Feedback loop and graph gate ────────────────────────────────────

    let mut feedback_section = loaded.config.feedback();
    if let Some(secs) = args.sweep_interval {
        feedback_section.sweep_interval_secs = secs;
    }
    let graph_section = loaded.config.graph();

    let feedback = Arc::new(FeedbackLoop::from_config(&feedback_section));
    let gate = Arc::new(GraphGate::from_config(&graph_section));

    if graph_section.enabled {
        match &graph_section.path {
            Some(path) => println!("Knowledge graph: {} (loads on first use)", path.display()),
            None => println!("Knowledge graph: in-memory (loads on first use)"),
        }
    } else {
        println!("Knowledge graph: disabled");
    }

    let shutdown = CancellationToken::new();

    let sweeper = match feedback_section.sweep_interval() {
        Some(interval) => {
            println!("Feedback sweep: every {}s", interval.as_secs());
            Some(spawn_sweeper(
                Arc::clone(&gate),
                Arc::clone(&feedback),
                interval,
                shutdown.clone(),
            ))
        }
        None => {
            println!("Feedback sweep: disabled (use POST /api/v1/admin/process)");
            None
        }
    };

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
            }
            shutdown.cancel();
        });
    }

    // ── Serve ───────────────────────────────────────────────────────────

    let server = Server::new(server_config, Arc::clone(&gate), Arc::clone(&feedback));
    let served = server.run_until(shutdown.clone()).await;
    shutdown.cancel();

    if let Some(handle) = sweeper
        && let Err(e) = handle.await
    {
        warn!(error = %e, "Feedback sweeper task failed");
    }

    flush_on_shutdown(&gate, &feedback).await;

    served?;
    Ok(())
}

/// First few characters of a token, for the startup banner.
fn token_preview(token: &str) -> String {
    token.chars().take(4).collect()
}

/// Give verified findings one last chance to reach the graph.
///
/// Pending findings are held in memory only, so anything left here is lost
/// on exit. The graph is only used if it was already loaded.
async fn flush_on_shutdown(gate: &GraphGate, feedback: &FeedbackLoop) {
    if gate.availability() != Availability::Available || !feedback.has_verified() {
        return;
    }

    let flush = tokio::time::timeout(Duration::from_secs(30), run_sweep(gate, feedback));
    match flush.await {
        Ok(report) => info!(persisted = report.persisted, "Final sweep finished"),
        Err(_) => warn!("Final sweep timed out"),
    }

    let remaining = feedback.get_statistics().pending_count;
    if remaining > 0 {
        warn!(pending = remaining, "Discarding pending findings on shutdown");
    }
}
