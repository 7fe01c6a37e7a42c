//! # Review Lock
//!
//! Single-owner advisory lock over a request. Acquiring sets `locked_by`
//! and `locked_at` together; releasing clears both. There is no timeout:
//! a lock abandoned by its holder stays until the holder releases it or an
//! administrator force-releases it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cnr_core::{ActorContext, Role, UserId};

use crate::action::LockPolicy;
use crate::error::{LockDenial, TransitionError};
use crate::record::RequestRecord;
use crate::transition;

/// Result of a lock operation that succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum LockChange {
    /// The caller now holds the lock.
    Acquired,
    /// The caller already held the lock; nothing was written.
    AlreadyHeld,
    /// The caller released its own lock.
    Released,
    /// An administrator cleared someone else's lock.
    ForceReleased {
        /// The user whose lock was cleared.
        previous: UserId,
    },
}

impl LockChange {
    /// Whether the record was modified.
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::AlreadyHeld)
    }
}

fn human(actor: &ActorContext, operation: &str) -> Result<UserId, TransitionError> {
    actor
        .user_id()
        .ok_or_else(|| TransitionError::denied(actor.role(), operation))
}

impl RequestRecord {
    /// The current lock holder.
    pub fn lock_holder(&self) -> Option<UserId> {
        self.locked_by()
    }

    /// Acquire the review lock for `actor`.
    ///
    /// Idempotent for the current holder. Only a role with a lock-requiring
    /// action available from the current status may acquire, so submitters,
    /// the system actor and lock-exempt roles never hold review locks.
    pub fn acquire_lock(
        &mut self,
        actor: &ActorContext,
        now: DateTime<Utc>,
    ) -> Result<LockChange, TransitionError> {
        let user = human(actor, "acquire a review lock")?;
        if actor.role() == Role::Submitter {
            return Err(TransitionError::denied(actor.role(), "acquire a review lock"));
        }
        match self.locked_by() {
            Some(holder) if holder == user => return Ok(LockChange::AlreadyHeld),
            Some(holder) => return Err(TransitionError::LockDenied(LockDenial::HeldByOther { holder })),
            None => {}
        }
        if self.status().is_terminal() {
            return Err(TransitionError::LockDenied(LockDenial::Terminal {
                status: self.status(),
            }));
        }
        let needs_lock = transition::available_actions_for(self.status(), actor.role())
            .into_iter()
            .any(|a| matches!(a.lock_policy(), LockPolicy::Acquire | LockPolicy::RequireHolder));
        if !needs_lock {
            return Err(TransitionError::denied(
                actor.role(),
                format!("acquire a review lock on a {} request", self.status()),
            ));
        }
        self.set_lock(Some(user), now);
        Ok(LockChange::Acquired)
    }

    /// Release a lock held by `actor`.
    pub fn release_lock(
        &mut self,
        actor: &ActorContext,
        now: DateTime<Utc>,
    ) -> Result<LockChange, TransitionError> {
        let user = human(actor, "release a review lock")?;
        match self.locked_by() {
            Some(holder) if holder == user => {
                self.set_lock(None, now);
                Ok(LockChange::Released)
            }
            Some(holder) => Err(TransitionError::LockDenied(LockDenial::HeldByOther { holder })),
            None => Err(TransitionError::LockDenied(LockDenial::NotHeld)),
        }
    }

    /// Administrative override: clear whoever holds the lock.
    pub fn force_release_lock(
        &mut self,
        actor: &ActorContext,
        now: DateTime<Utc>,
    ) -> Result<LockChange, TransitionError> {
        if actor.role() != Role::Admin {
            return Err(TransitionError::denied(actor.role(), "force-release a review lock"));
        }
        let previous = self
            .locked_by()
            .ok_or(TransitionError::LockDenied(LockDenial::NotHeld))?;
        self.set_lock(None, now);
        Ok(LockChange::ForceReleased { previous })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionKind, WorkflowCommand};
    use crate::record::tests::{fresh, t0};
    use crate::status::RequestStatus;
    use chrono::Duration;

    fn auditor() -> (UserId, ActorContext) {
        let id = UserId::new();
        (id, ActorContext::user(id, Role::Auditor).unwrap())
    }

    #[test]
    fn acquire_then_reacquire_is_noop() {
        let mut record = fresh();
        let (id, a) = auditor();
        assert_eq!(record.acquire_lock(&a, t0()).unwrap(), LockChange::Acquired);
        let version = record.version();
        assert_eq!(
            record.acquire_lock(&a, t0() + Duration::minutes(5)).unwrap(),
            LockChange::AlreadyHeld
        );
        assert_eq!(record.version(), version);
        assert_eq!(record.lock_holder(), Some(id));
        assert_eq!(record.locked_at(), Some(t0()));
    }

    #[test]
    fn acquire_held_by_other_is_denied() {
        let mut record = fresh();
        let (a_id, a) = auditor();
        let (_, b) = auditor();
        record.acquire_lock(&a, t0()).unwrap();
        assert_eq!(
            record.acquire_lock(&b, t0()),
            Err(TransitionError::LockDenied(LockDenial::HeldByOther { holder: a_id }))
        );
    }

    #[test]
    fn release_requires_holder() {
        let mut record = fresh();
        let (_, a) = auditor();
        let (_, b) = auditor();
        assert_eq!(
            record.release_lock(&a, t0()),
            Err(TransitionError::LockDenied(LockDenial::NotHeld))
        );
        record.acquire_lock(&a, t0()).unwrap();
        assert!(record.release_lock(&b, t0()).is_err());
        assert_eq!(record.release_lock(&a, t0()).unwrap(), LockChange::Released);
        assert_eq!(record.locked_by(), None);
        assert_eq!(record.locked_at(), None);
    }

    #[test]
    fn terminal_request_cannot_be_locked() {
        let mut record = fresh();
        let (_, a) = auditor();
        record.apply(&WorkflowCommand::new(ActionKind::Take), &a, t0(), Duration::days(7)).unwrap();
        record
            .apply(&WorkflowCommand::new(ActionKind::Reject).with_note("duplicate"), &a, t0(), Duration::days(7))
            .unwrap();
        assert_eq!(record.status(), RequestStatus::Rejected);
        let (_, b) = auditor();
        assert_eq!(
            record.acquire_lock(&b, t0()),
            Err(TransitionError::LockDenied(LockDenial::Terminal {
                status: RequestStatus::Rejected
            }))
        );
    }

    #[test]
    fn only_admin_may_force_release() {
        let mut record = fresh();
        let (a_id, a) = auditor();
        record.acquire_lock(&a, t0()).unwrap();
        let (_, director) = {
            let id = UserId::new();
            (id, ActorContext::user(id, Role::Director).unwrap())
        };
        assert_eq!(
            record.force_release_lock(&director, t0()).unwrap_err().code(),
            "permission_denied"
        );
        let admin = ActorContext::user(UserId::new(), Role::Admin).unwrap();
        assert_eq!(
            record.force_release_lock(&admin, t0()).unwrap(),
            LockChange::ForceReleased { previous: a_id }
        );
        assert_eq!(record.lock_holder(), None);
    }

    #[test]
    fn system_and_submitter_never_lock() {
        let mut record = fresh();
        assert!(record.acquire_lock(&ActorContext::system(), t0()).is_err());
        let submitter = ActorContext::user(UserId::new(), Role::Submitter).unwrap();
        assert!(record.acquire_lock(&submitter, t0()).is_err());
    }

    #[test]
    fn lock_exempt_roles_cannot_block_review() {
        let mut record = fresh();
        for role in [Role::PaymentClerk, Role::IpExpert, Role::RegistryOfficer, Role::Director] {
            let actor = ActorContext::user(UserId::new(), role).unwrap();
            assert_eq!(record.acquire_lock(&actor, t0()).unwrap_err().code(), "permission_denied");
        }
        assert_eq!(record.lock_holder(), None);

        let (a_id, a) = auditor();
        record.apply(&WorkflowCommand::new(ActionKind::Take), &a, t0(), Duration::days(7)).unwrap();
        assert_eq!(record.lock_holder(), Some(a_id));
    }

    #[test]
    fn auditor_cannot_lock_where_no_lock_is_needed() {
        let mut parts = fresh().to_parts();
        parts.status = RequestStatus::AwaitingPayment;
        let mut record = RequestRecord::from_parts(parts).unwrap();
        let (_, a) = auditor();
        assert_eq!(record.acquire_lock(&a, t0()).unwrap_err().code(), "permission_denied");
    }
}
