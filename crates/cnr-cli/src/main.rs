//! # cnr CLI entry point
//!
//! Parses command-line arguments, initializes tracing, assembles the
//! workflow engine and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cnr_cli::actions::{run_actions, ActionsArgs};
use cnr_cli::context::build_engine;
use cnr_cli::history::{run_history, run_verify, HistoryArgs, VerifyArgs};
use cnr_cli::lock::{run_force_release, ForceReleaseArgs};
use cnr_cli::sweep::{run_daemon, run_sweep, DaemonArgs, SweepArgs};

/// Company name registry operator CLI.
///
/// Runs the reservation sweeper, inspects and audits request history, and
/// performs administrative lock release.
#[derive(Parser, Debug)]
#[command(name = "cnr", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Postgres connection string. Required by every subcommand except `actions`.
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one reservation sweeper tick.
    Sweep(SweepArgs),

    /// Run the reservation sweeper until interrupted.
    Daemon(DaemonArgs),

    /// List the actions available from a status.
    Actions(ActionsArgs),

    /// Print a request's history.
    History(HistoryArgs),

    /// Verify a request's history hash chain.
    VerifyHistory(VerifyArgs),

    /// Administratively clear a request's review lock.
    ForceRelease(ForceReleaseArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    match dispatch(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<u8> {
    if let Commands::Actions(args) = &cli.command {
        return run_actions(args);
    }

    let engine = build_engine(cli.database_url.as_deref()).await?;
    match cli.command {
        Commands::Sweep(args) => run_sweep(&args, engine).await,
        Commands::Daemon(args) => run_daemon(&args, engine).await,
        Commands::History(args) => run_history(&args, engine).await,
        Commands::VerifyHistory(args) => run_verify(&args, engine).await,
        Commands::ForceRelease(args) => run_force_release(&args, engine).await,
        Commands::Actions(args) => run_actions(&args),
    }
}
