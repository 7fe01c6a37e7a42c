//! # Actions Subcommand
//!
//! Lists the actions the transition table offers from a status, optionally
//! narrowed to one role. Reads no stored state.

use anyhow::Result;
use clap::Args;

use cnr_core::Role;
use cnr_state::{available_actions, available_actions_for, rule_for, RequestStatus};

/// Arguments for `cnr actions`.
#[derive(Args, Debug)]
pub struct ActionsArgs {
    /// Status name (e.g. `AWAITING_PAYMENT`) or numeric code.
    pub status: RequestStatus,

    /// Only list actions this role may perform.
    #[arg(long)]
    pub role: Option<Role>,
}

pub fn run_actions(args: &ActionsArgs) -> Result<u8> {
    let actions = match args.role {
        Some(role) => available_actions_for(args.status, role),
        None => available_actions(args.status),
    };

    if actions.is_empty() {
        println!("{}: no actions available", args.status);
        return Ok(0);
    }

    for action in actions {
        let target = rule_for(args.status, action)
            .map(|rule| rule.to.as_str())
            .unwrap_or("?");
        println!(
            "{:<24} {:<18} -> {}",
            action.as_str(),
            action.required_role().as_str(),
            target
        );
    }
    Ok(0)
}
