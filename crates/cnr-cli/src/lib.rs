//! # cnr-cli — Company Name Registry Operator CLI
//!
//! Operational entry points over `cnr-workflow`. Interactive request
//! handling belongs to the web application; this binary covers what
//! operators run by hand or from a scheduler.
//!
//! ## Subcommands
//!
//! - `sweep`: run one reservation sweeper tick and report the counters
//! - `daemon`: run the sweeper on its configured interval until Ctrl-C
//! - `actions`: list the actions the transition table offers for a status
//! - `history`: print a request's history, optionally as the submitter sees it
//! - `verify-history`: check a request's history hash chain
//! - `force-release`: administrative release of a stuck request lock
//!
//! ## Crate Policy
//!
//! - Argument parsing is separated from handlers; handlers delegate to
//!   `WorkflowEngine` and carry no workflow rules of their own.
//! - Every subcommand except `actions` needs `DATABASE_URL` and exits with
//!   an error when it is missing.
//! - Handlers return the process exit code: 0 success, 1 error, 2 a
//!   negative check result (broken chain, unknown request).

pub mod actions;
pub mod context;
pub mod history;
pub mod lock;
pub mod sweep;
