//! # Sweep and Daemon Subcommands
//!
//! `sweep` runs a single reservation sweeper tick, suited to an external
//! scheduler. `daemon` keeps the sweeper running on `CNR_SWEEP_INTERVAL_SECS`
//! until interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;

use cnr_workflow::{ReservationExpirySweeper, WorkflowEngine};

/// Arguments for `cnr sweep`.
#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Print the tick report as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `cnr daemon`.
#[derive(Args, Debug)]
pub struct DaemonArgs {}

/// Run one sweeper tick.
pub async fn run_sweep(args: &SweepArgs, engine: Arc<WorkflowEngine>) -> Result<u8> {
    let sweeper = ReservationExpirySweeper::new(engine);
    let report = sweeper.tick().await.context("sweep tick failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "reserved {}  warned {}  expired {}  conflicts {}  failures {}",
            report.reserved, report.warned, report.expired, report.conflicts, report.failures
        );
    }
    Ok(if report.failures > 0 { 1 } else { 0 })
}

/// Run the sweeper until Ctrl-C.
pub async fn run_daemon(_args: &DaemonArgs, engine: Arc<WorkflowEngine>) -> Result<u8> {
    let sweeper = Arc::new(ReservationExpirySweeper::new(engine));
    let shutdown = CancellationToken::new();

    let worker = {
        let sweeper = sweeper.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { sweeper.run(shutdown).await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");
    shutdown.cancel();

    worker.await.context("sweeper task panicked")?;
    Ok(0)
}
