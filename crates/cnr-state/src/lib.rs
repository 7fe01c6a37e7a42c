//! # cnr-state — Request Lifecycle State Machine
//!
//! The registration request lifecycle as data plus one guarded mutation
//! path.
//!
//! - **Status** (`status.rs`): the closed 14-value `RequestStatus` catalog
//!   with stable numeric codes.
//!
//! - **Actions** (`action.rs`): `ActionKind` with its required role, lock
//!   policy and lock effect; the `WorkflowCommand` payload; the ledger
//!   `ActionType`.
//!
//! - **Transitions** (`transition.rs`): the single `TRANSITION_TABLE`, the
//!   pure `validate()` function and `available_actions()`.
//!
//! - **Record** (`record.rs`): `RequestRecord`, whose status and lock fields
//!   are private. `RequestRecord::apply` is the only way to change status.
//!
//! - **Lock** (`lock.rs`): acquire, release and admin force-release on a
//!   record.
//!
//! ## Design
//!
//! Every legal path is one row of `TRANSITION_TABLE`. No other code branches
//! on status to decide what may happen next, so the exhaustive matrix test
//! over `RequestStatus::ALL × ActionKind::ALL × Role::ALL` covers the whole
//! lifecycle. This crate performs no I/O.

pub mod action;
pub mod error;
pub mod lock;
pub mod record;
pub mod status;
pub mod transition;

pub use action::{
    ActionKind, ActionPayload, ActionType, IpVerdict, LockEffect, LockPolicy, WorkflowCommand,
};
pub use error::{LockDenial, TransitionError};
pub use lock::LockChange;
pub use record::{NewRequest, RecordParts, RequestRecord, TransitionOutcome};
pub use status::RequestStatus;
pub use transition::{
    available_actions, available_actions_for, rule_for, validate, TransitionRule, TRANSITION_TABLE,
};
