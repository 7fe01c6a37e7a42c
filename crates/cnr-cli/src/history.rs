//! # History Subcommands
//!
//! `history` prints a request's ledger, either complete (staff view) or
//! with internal entries hidden (submitter view). `verify-history`
//! recomputes the hash chain and reports the first broken entry.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use cnr_core::RequestId;
use cnr_workflow::{HistoryView, WorkflowEngine, WorkflowError};

/// Arguments for `cnr history`.
#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Request identifier.
    pub id: RequestId,

    /// Hide internal entries, as the applicant sees the history.
    #[arg(long)]
    pub submitter_view: bool,

    /// Print entries as a JSON array.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `cnr verify-history`.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Request identifier.
    pub id: RequestId,
}

pub async fn run_history(args: &HistoryArgs, engine: Arc<WorkflowEngine>) -> Result<u8> {
    let view = if args.submitter_view {
        HistoryView::SubmitterVisible
    } else {
        HistoryView::All
    };

    let entries = match engine.history(args.id, view).await {
        Ok(entries) => entries,
        Err(WorkflowError::NotFound(id)) => {
            eprintln!("request {id} not found");
            return Ok(2);
        }
        Err(e) => return Err(e.into()),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(0);
    }

    for entry in &entries {
        let actor = entry
            .user_id
            .map(|u| u.to_string())
            .unwrap_or_else(|| "system".to_string());
        let marker = if entry.is_internal { " [internal]" } else { "" };
        println!(
            "#{:<3} {}  {:<24} {:<18} {}{}",
            entry.sequence,
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.action_type.label(),
            entry.role.as_str(),
            actor,
            marker
        );
        if let Some(note) = &entry.note {
            println!("      {note}");
        }
    }
    Ok(0)
}

pub async fn run_verify(args: &VerifyArgs, engine: Arc<WorkflowEngine>) -> Result<u8> {
    let verification = match engine.verify_history(args.id).await {
        Ok(v) => v,
        Err(WorkflowError::NotFound(id)) => {
            eprintln!("request {id} not found");
            return Ok(2);
        }
        Err(e) => return Err(e.into()),
    };

    match verification.first_broken {
        None => {
            println!(
                "request {}: {} entries, chain intact",
                verification.request_id, verification.entries
            );
            Ok(0)
        }
        Some(sequence) => {
            tracing::error!(request_id = %verification.request_id, sequence, "history chain broken");
            println!(
                "request {}: chain broken at entry #{sequence} of {}",
                verification.request_id, verification.entries
            );
            Ok(2)
        }
    }
}
