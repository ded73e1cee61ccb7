//! Status command - shows server health, gate state and feedback counters.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use super::Context;
use crate::client::{Client, Diagnostics, GateStatus};

/// Arguments for the status command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// API token for the diagnostics endpoint (or set TESSERA_API_TOKEN env var)
    #[arg(long, env = "TESSERA_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

/// Status response for JSON output.
#[derive(Debug, Serialize)]
struct StatusOutput {
    running: bool,
    version: Option<String>,
    server_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostics: Option<Diagnostics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Run the status command.
pub async fn run(args: StatusArgs, ctx: &Context) -> Result<()> {
    let token = args
        .token
        .or_else(|| ctx.loaded.config.server().auth_token);
    let client = Client::new(&ctx.server_url, token)?;

    let health = match client.health().await {
        Ok(health) => health,
        Err(e) => {
            print_not_running(ctx, &e.to_string())?;
            return Ok(());
        }
    };

    let (diagnostics, error) = match client.diagnostics().await {
        Ok(d) => (Some(d), None),
        Err(e) => (None, Some(e.to_string())),
    };

    if ctx.json_output {
        let output = StatusOutput {
            running: true,
            version: Some(health.version),
            server_url: ctx.server_url.clone(),
            diagnostics,
            error,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let green = Style::new().green();
    let dim = Style::new().dim();

    println!();
    println!("{}", style("Tessera Server Status").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!(
        "  {} {}",
        dim.apply_to("Status:"),
        green.apply_to(format!("● running ({})", health.status))
    );
    println!("  {} {}", dim.apply_to("Version:"), health.version);
    println!("  {} {}", dim.apply_to("Server:"), ctx.server_url);

    match diagnostics {
        Some(d) => {
            println!();
            println!("{}", style("Knowledge graph").bold());
            println!("  {} {}", dim.apply_to("Availability:"), describe_gate(&d.graph));
            println!("  {} {}", dim.apply_to("Loads:"), d.graph.load_count);
            if let Some(at) = &d.graph.load_attempted_at {
                println!("  {} {}", dim.apply_to("Last attempt:"), at);
            }
            if let Some(err) = &d.graph.last_error {
                println!("  {} {}", dim.apply_to("Last error:"), Style::new().red().apply_to(err));
            }

            let f = &d.feedback;
            println!();
            println!("{}", style("Feedback loop").bold());
            println!("  {} {}", dim.apply_to("Pending:"), f.pending_count);
            println!("  {} {}", dim.apply_to("Verified:"), f.verified_count);
            println!("  {} {}", dim.apply_to("Received:"), f.findings_received);
            println!("  {} {}", dim.apply_to("Deduplicated:"), f.findings_deduplicated);
            println!("  {} {}", dim.apply_to("Rejected:"), f.findings_rejected);
            println!("  {} {}", dim.apply_to("Persisted:"), f.findings_persisted);
            println!("  {} {}", dim.apply_to("Evicted:"), f.findings_evicted);
            if f.persist_failures > 0 {
                println!(
                    "  {} {}",
                    dim.apply_to("Persist failures:"),
                    Style::new().yellow().apply_to(f.persist_failures)
                );
            }
        }
        None => {
            println!("  {} {}", dim.apply_to("Graph:"), health.graph);
            println!();
            println!(
                "  {} unavailable{}",
                dim.apply_to("Diagnostics:"),
                if ctx.verbose {
                    format!(" ({})", error.unwrap_or_default())
                } else {
                    String::new()
                }
            );
            println!("  {}", dim.apply_to("Pass --token if the server requires auth"));
        }
    }

    println!();
    Ok(())
}

fn print_not_running(ctx: &Context, error: &str) -> Result<()> {
    if ctx.json_output {
        let output = StatusOutput {
            running: false,
            version: None,
            server_url: ctx.server_url.clone(),
            diagnostics: None,
            error: Some(error.to_string()),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let red = Style::new().red();
    let dim = Style::new().dim();

    println!();
    println!("{}", style("Tessera Server Status").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!("  {} {}", dim.apply_to("Status:"), red.apply_to("● not running"));
    println!("  {} {}", dim.apply_to("Server:"), ctx.server_url);

    if ctx.verbose {
        println!();
        println!("  {} {}", dim.apply_to("Error:"), error);
    }

    println!();
    println!("  {}", dim.apply_to("Start the server with: tessera start"));
    println!();
    Ok(())
}

fn describe_gate(status: &GateStatus) -> String {
    match status.available {
        None => "not loaded yet".to_string(),
        Some(true) => "available".to_string(),
        Some(false) => "unavailable".to_string(),
    }
}
