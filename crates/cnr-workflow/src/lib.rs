//! # cnr-workflow — Request Workflow Orchestration
//!
//! Drives `cnr-state` records through their lifecycle against real
//! collaborators.
//!
//! - **Engine** (`engine.rs`): `WorkflowEngine::execute`, the sole
//!   status-mutation entry point, plus intake, history and lock queries.
//! - **Lock manager** (`lock.rs`): persisted acquire / release /
//!   admin force-release.
//! - **History ledger** (`history.rs`): append-only, SHA-256 hash-chained
//!   `RequestAction` entries with submitter-facing filtering.
//! - **Sweeper** (`sweeper.rs`): periodic reservation deadline enforcement.
//! - **Collaborators**: the `RequestStore` trait with in-memory
//!   (`store.rs`) and Postgres (`postgres.rs`) adapters, and the
//!   `NotificationDispatcher` trait (`notify.rs`).
//!
//! ## Concurrency
//!
//! Every write is a compare-and-swap on the record's `version` together
//! with its history append. Two writers racing on the same request cannot
//! both commit: the loser gets `WorkflowError::ConcurrencyConflict` and
//! may reload and retry. Requests never block one another.

pub mod engine;
pub mod error;
pub mod history;
pub mod lock;
pub mod notify;
pub mod postgres;
pub mod store;
pub mod sweeper;

pub use engine::{WorkflowEngine, AUTO_CANCEL_NOTE};
pub use error::{Result, StoreError, WorkflowError};
pub use history::{
    verify_chain, ActionDraft, ChainVerification, HistoryLedger, HistoryView, RequestAction,
    GENESIS_HASH,
};
pub use lock::LockManager;
pub use notify::{
    LogNotifier, Notification, NotificationDispatcher, NotificationKind, NotifyError, Recipient,
    SentNotification,
};
pub use postgres::{init_pool, PgRequestStore};
pub use store::{Commit, InMemoryStore, RequestStore};
pub use sweeper::{ReservationExpirySweeper, SweepReport};
