//! # Lock Manager
//!
//! Persisted review-lock operations. Each operation loads the record,
//! applies the lock rule from `cnr-state`, and commits through the same
//! version check as a transition, with an internal ledger entry. An
//! idempotent re-acquire writes nothing.

use std::sync::Arc;

use cnr_core::{ActorContext, Clock, RequestId, UserId};
use cnr_state::{ActionType, LockChange, RequestRecord, TransitionError};

use crate::error::{Result, WorkflowError};
use crate::history::ActionDraft;
use crate::store::{Commit, RequestStore};

/// Acquire, release and force-release review locks.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn RequestStore>,
    clock: Arc<dyn Clock>,
}

impl LockManager {
    pub fn new(store: Arc<dyn RequestStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Current holder of the lock on `id`.
    pub async fn current_holder(&self, id: RequestId) -> Result<Option<UserId>> {
        Ok(self.load(id).await?.lock_holder())
    }

    /// Acquire the lock for `actor`. Re-acquiring a held lock is a no-op.
    pub async fn acquire(&self, id: RequestId, actor: &ActorContext) -> Result<LockChange> {
        self.mutate(id, actor, RequestRecord::acquire_lock).await
    }

    /// Release a lock the actor holds.
    pub async fn release(&self, id: RequestId, actor: &ActorContext) -> Result<LockChange> {
        self.mutate(id, actor, RequestRecord::release_lock).await
    }

    /// Administrative override clearing any holder's lock.
    pub async fn force_release(&self, id: RequestId, admin: &ActorContext) -> Result<LockChange> {
        self.mutate(id, admin, RequestRecord::force_release_lock).await
    }

    async fn load(&self, id: RequestId) -> Result<RequestRecord> {
        self.store
            .load(id)
            .await?
            .ok_or(WorkflowError::NotFound(id))
    }

    async fn mutate(
        &self,
        id: RequestId,
        actor: &ActorContext,
        op: fn(&mut RequestRecord, &ActorContext, chrono::DateTime<chrono::Utc>) -> std::result::Result<LockChange, TransitionError>,
    ) -> Result<LockChange> {
        let now = self.clock.now();
        let mut record = self.load(id).await?;
        let expected_version = record.version();

        let change = op(&mut record, actor, now).map_err(|e| {
            tracing::debug!(request_id = %id, actor = %actor, error = %e, "lock operation refused");
            WorkflowError::from_transition(id, e)
        })?;

        let (action_type, note) = match change {
            LockChange::AlreadyHeld => return Ok(change),
            LockChange::Acquired => (ActionType::LockAcquired, None),
            LockChange::Released => (ActionType::LockReleased, None),
            LockChange::ForceReleased { previous } => (
                ActionType::LockForceReleased,
                Some(format!("lock held by {previous} cleared by administrator")),
            ),
        };

        self.store
            .commit(Commit {
                record,
                expected_version,
                entries: vec![ActionDraft::new(actor, action_type, note, now)],
            })
            .await?;

        match change {
            LockChange::ForceReleased { previous } => {
                tracing::warn!(request_id = %id, admin = %actor, previous = %previous, "review lock force-released");
            }
            _ => tracing::info!(request_id = %id, actor = %actor, change = ?change, "review lock updated"),
        }
        Ok(change)
    }
}
