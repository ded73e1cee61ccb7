//! Background promotion of verified findings.
//!
//! The sweeper is the only place that reaches the knowledge graph on a timer.
//! Each tick evicts expired findings and, when at least one finding is
//! verified, loads the graph through the gate and persists the batch. Nothing
//! on a tick ever fails the task: an unavailable graph just means the tick
//! persists nothing.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::feedback::FeedbackLoop;
use crate::subsystem::GraphGate;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted: usize,
    pub persisted: usize,
}

/// Run one sweep: evict, then persist through the gate.
///
/// The gate is only consulted when something is verified, so an idle loop
/// never triggers the expensive graph load.
pub async fn run_sweep(gate: &GraphGate, feedback: &FeedbackLoop) -> SweepReport {
    let evicted = feedback.evict_expired(Utc::now());

    if !feedback.has_verified() {
        return SweepReport {
            evicted,
            persisted: 0,
        };
    }

    let client = gate.get_client().await;
    let persisted = feedback.process_pending(client.as_deref()).await;
    SweepReport { evicted, persisted }
}

/// Spawn the periodic sweeper. It stops when `shutdown` is cancelled.
pub fn spawn_sweeper(
    gate: Arc<GraphGate>,
    feedback: Arc<FeedbackLoop>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    // tokio::time::interval panics on a zero period.
    let period = interval.max(Duration::from_millis(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so startup stays cheap.
        ticker.tick().await;

        info!(interval_ms = period.as_millis() as u64, "Feedback sweeper started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                _ = ticker.tick() => {
                    let report = run_sweep(&gate, &feedback).await;
                    if report.evicted > 0 || report.persisted > 0 {
                        debug!(
                            evicted = report.evicted,
                            persisted = report.persisted,
                            "Sweep finished"
                        );
                    }
                }
            }
        }

        info!("Feedback sweeper stopped");
    })
}
