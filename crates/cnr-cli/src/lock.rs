//! # Force-Release Subcommand
//!
//! Clears a lock left behind by a staff member who walked away from a
//! request. Runs as the given administrator and is recorded in the
//! request's history like any other lock change.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use cnr_core::{ActorContext, RequestId, Role, UserId};
use cnr_state::{LockChange, LockDenial};
use cnr_workflow::{WorkflowEngine, WorkflowError};

/// Arguments for `cnr force-release`.
#[derive(Args, Debug)]
pub struct ForceReleaseArgs {
    /// Request identifier.
    pub id: RequestId,

    /// Administrator performing the release.
    #[arg(long)]
    pub admin: UserId,
}

pub async fn run_force_release(args: &ForceReleaseArgs, engine: Arc<WorkflowEngine>) -> Result<u8> {
    let admin = ActorContext::user(args.admin, Role::Admin).context("invalid administrator")?;

    match engine.force_release_lock(args.id, &admin).await {
        Ok(LockChange::ForceReleased { previous }) => {
            println!("request {}: released lock held by {previous}", args.id);
        }
        Ok(other) => println!("request {}: {other:?}", args.id),
        Err(WorkflowError::LockDenied {
            denial: LockDenial::NotHeld,
            ..
        }) => {
            println!("request {}: not locked", args.id);
            return Ok(2);
        }
        Err(e) => {
            return Err(anyhow::Error::new(e).context(format!("force release of request {} failed", args.id)));
        }
    }
    Ok(0)
}
