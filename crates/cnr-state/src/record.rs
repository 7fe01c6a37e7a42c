//! # Request Record
//!
//! The registration request as the workflow sees it. Status and lock fields
//! are private: the only way to change them is [`RequestRecord::apply`] (a
//! table-approved transition) or the lock operations in [`crate::lock`].
//! Both check every invariant before mutating anything, so a refused
//! operation leaves the record exactly as it was.
//!
//! ## Invariants
//!
//! - `locked_by` is set iff `locked_at` is set.
//! - `reservation_expiry_date` is set iff the status is `TemporarilyReserved`.
//! - Terminal requests are never locked.
//! - `version` increases by one on every mutation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use cnr_core::{ActorContext, CompanyTypeId, InvoiceId, ProvinceId, RequestId, UserId, ValidationError};

use crate::action::{ActionKind, IpVerdict, LockEffect, LockPolicy, WorkflowCommand};
use crate::error::{LockDenial, TransitionError};
use crate::status::RequestStatus;
use crate::transition;

const MAX_COMPANY_NAME_LEN: usize = 255;

// ─── Intake ──────────────────────────────────────────────────────────

/// Data captured by province intake when a request is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequest {
    /// Proposed company name.
    pub company_name: String,
    /// Legal form.
    pub company_type_id: CompanyTypeId,
    /// Province of intake.
    pub province_id: ProvinceId,
    /// Applicant who receives submitter-facing notifications.
    pub submitted_by: UserId,
}

impl NewRequest {
    /// Check the intake fields.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let name = self.company_name.trim();
        if name.is_empty() {
            return Err(ValidationError::Invariant(
                "company name must not be empty".to_string(),
            ));
        }
        if name.chars().count() > MAX_COMPANY_NAME_LEN {
            return Err(ValidationError::Invariant(format!(
                "company name exceeds {MAX_COMPANY_NAME_LEN} characters"
            )));
        }
        Ok(())
    }
}

// ─── Record ──────────────────────────────────────────────────────────

/// Plain field bag used for persistence and serialization.
///
/// Converting back into a [`RequestRecord`] re-checks every invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordParts {
    pub id: RequestId,
    pub company_name: String,
    pub company_type_id: CompanyTypeId,
    pub province_id: ProvinceId,
    pub submitted_by: UserId,
    pub status: RequestStatus,
    pub locked_by: Option<UserId>,
    pub locked_at: Option<DateTime<Utc>>,
    pub reservation_expiry_date: Option<DateTime<Utc>>,
    pub registry_number: Option<String>,
    pub registry_date: Option<DateTime<Utc>>,
    pub invoice_id: Option<InvoiceId>,
    pub ip_expert_id: Option<UserId>,
    pub ip_expert_feedback: Option<String>,
    pub ip_verdict: Option<IpVerdict>,
    pub auditor_feedback: Option<String>,
    pub leadership_feedback: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RecordParts", into = "RecordParts")]
pub struct RequestRecord {
    id: RequestId,
    company_name: String,
    company_type_id: CompanyTypeId,
    province_id: ProvinceId,
    submitted_by: UserId,
    status: RequestStatus,
    locked_by: Option<UserId>,
    locked_at: Option<DateTime<Utc>>,
    reservation_expiry_date: Option<DateTime<Utc>>,
    registry_number: Option<String>,
    registry_date: Option<DateTime<Utc>>,
    invoice_id: Option<InvoiceId>,
    ip_expert_id: Option<UserId>,
    ip_expert_feedback: Option<String>,
    ip_verdict: Option<IpVerdict>,
    auditor_feedback: Option<String>,
    leadership_feedback: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Summary of a successful transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub action: ActionKind,
    pub from: RequestStatus,
    pub to: RequestStatus,
    /// The lock holder before the transition, if the lock was released.
    pub released_lock: Option<UserId>,
}

impl RequestRecord {
    /// Create a fresh `New` record at version 0.
    pub fn register(id: RequestId, new: NewRequest, now: DateTime<Utc>) -> Result<Self, ValidationError> {
        new.validate()?;
        Ok(Self {
            id,
            company_name: new.company_name.trim().to_string(),
            company_type_id: new.company_type_id,
            province_id: new.province_id,
            submitted_by: new.submitted_by,
            status: RequestStatus::New,
            locked_by: None,
            locked_at: None,
            reservation_expiry_date: None,
            registry_number: None,
            registry_date: None,
            invoice_id: None,
            ip_expert_id: None,
            ip_expert_feedback: None,
            ip_verdict: None,
            auditor_feedback: None,
            leadership_feedback: None,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuild a record from stored fields, rejecting any that break an
    /// invariant.
    pub fn from_parts(parts: RecordParts) -> Result<Self, ValidationError> {
        let record = Self {
            id: parts.id,
            company_name: parts.company_name,
            company_type_id: parts.company_type_id,
            province_id: parts.province_id,
            submitted_by: parts.submitted_by,
            status: parts.status,
            locked_by: parts.locked_by,
            locked_at: parts.locked_at,
            reservation_expiry_date: parts.reservation_expiry_date,
            registry_number: parts.registry_number,
            registry_date: parts.registry_date,
            invoice_id: parts.invoice_id,
            ip_expert_id: parts.ip_expert_id,
            ip_expert_feedback: parts.ip_expert_feedback,
            ip_verdict: parts.ip_verdict,
            auditor_feedback: parts.auditor_feedback,
            leadership_feedback: parts.leadership_feedback,
            version: parts.version,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        };
        record.check_invariants()?;
        Ok(record)
    }

    /// Copy every field out.
    pub fn to_parts(&self) -> RecordParts {
        self.clone().into()
    }

    /// Verify the record invariants.
    pub fn check_invariants(&self) -> Result<(), ValidationError> {
        if self.locked_by.is_some() != self.locked_at.is_some() {
            return Err(ValidationError::Invariant(format!(
                "{}: locked_by and locked_at must be set together",
                self.id
            )));
        }
        let reserved = self.status == RequestStatus::TemporarilyReserved;
        if reserved != self.reservation_expiry_date.is_some() {
            return Err(ValidationError::Invariant(format!(
                "{}: reservation expiry must be set exactly while TEMPORARILY_RESERVED (status {})",
                self.id, self.status
            )));
        }
        if self.status.is_terminal() && self.locked_by.is_some() {
            return Err(ValidationError::Invariant(format!(
                "{}: terminal request {} is locked",
                self.id, self.status
            )));
        }
        if self.version < 0 {
            return Err(ValidationError::Invariant(format!(
                "{}: negative version {}",
                self.id, self.version
            )));
        }
        Ok(())
    }

    /// Apply a workflow command.
    ///
    /// Checks, in order: the actor's role, a lock held by someone else,
    /// legality of `(status, action)`, the lock requirement, the payload,
    /// and for technical reports the assigned expert. Nothing is mutated
    /// unless every check passes.
    pub fn apply(
        &mut self,
        command: &WorkflowCommand,
        actor: &ActorContext,
        now: DateTime<Utc>,
        reservation_ttl: Duration,
    ) -> Result<TransitionOutcome, TransitionError> {
        let action = command.kind;
        let policy = action.lock_policy();

        transition::authorize(action, actor.role())?;

        if matches!(policy, LockPolicy::Acquire | LockPolicy::RequireHolder) {
            if let Some(holder) = self.locked_by {
                if actor.user_id() != Some(holder) {
                    return Err(TransitionError::LockDenied(LockDenial::HeldByOther { holder }));
                }
            }
        }

        let to = transition::target(self.status, action)?;

        if policy == LockPolicy::RequireHolder && self.locked_by.is_none() {
            return Err(TransitionError::LockDenied(LockDenial::NotHeld));
        }

        command.payload.validate_for(action)?;

        if action == ActionKind::SubmitTechnicalReport && self.ip_expert_id != actor.user_id() {
            return Err(TransitionError::denied(
                actor.role(),
                "submit a report for a request assigned to another expert",
            ));
        }

        let expiry = match action {
            ActionKind::Reserve => Some(
                now.checked_add_signed(reservation_ttl)
                    .ok_or(TransitionError::DeadlineOutOfRange { action })?,
            ),
            _ => None,
        };

        let from = self.status;
        self.apply_fields(command, now, expiry);
        self.status = to;

        if policy == LockPolicy::Acquire && self.locked_by.is_none() {
            self.locked_by = actor.user_id();
            self.locked_at = self.locked_by.map(|_| now);
        }
        let mut released_lock = None;
        if action.lock_effect() == LockEffect::Release || to.is_terminal() {
            released_lock = self.locked_by.take();
            self.locked_at = None;
        }
        if to != RequestStatus::TemporarilyReserved {
            self.reservation_expiry_date = None;
        }

        self.touch(now);
        debug_assert!(self.check_invariants().is_ok());

        Ok(TransitionOutcome {
            action,
            from,
            to,
            released_lock,
        })
    }

    fn apply_fields(&mut self, command: &WorkflowCommand, now: DateTime<Utc>, expiry: Option<DateTime<Utc>>) {
        let payload = &command.payload;
        let feedback = payload.feedback_text().map(str::to_string);
        match command.kind {
            ActionKind::Take | ActionKind::SweeperExpire | ActionKind::StrikeOff => {}
            ActionKind::RequestIpReview => {
                self.ip_expert_id = payload.ip_expert_id;
                self.ip_expert_feedback = None;
                self.ip_verdict = None;
                if feedback.is_some() {
                    self.auditor_feedback = feedback;
                }
            }
            ActionKind::ForwardLeadership
            | ActionKind::ApproveAwaitPayment
            | ActionKind::Return
            | ActionKind::Forward => {
                if feedback.is_some() {
                    self.auditor_feedback = feedback;
                }
            }
            ActionKind::Reject => {
                self.auditor_feedback = feedback.or_else(|| payload.note_text().map(str::to_string));
            }
            ActionKind::SubmitTechnicalReport => {
                self.ip_expert_feedback = feedback;
                self.ip_verdict = payload.ip_verdict;
            }
            ActionKind::DirectorForward | ActionKind::DirectorReturn | ActionKind::MinisterDecision => {
                if feedback.is_some() {
                    self.leadership_feedback = feedback;
                }
            }
            ActionKind::ConfirmPayment => {
                self.invoice_id = payload.invoice_id;
            }
            ActionKind::Reserve => {
                self.reservation_expiry_date = expiry;
            }
            ActionKind::FinalizeRegistry => {
                self.registry_number = payload
                    .registry_number
                    .as_deref()
                    .map(|n| n.trim().to_string());
                self.registry_date = Some(payload.registry_date.unwrap_or(now));
            }
        }
    }

    pub(crate) fn set_lock(&mut self, holder: Option<UserId>, now: DateTime<Utc>) {
        self.locked_by = holder;
        self.locked_at = holder.map(|_| now);
        self.touch(now);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn company_name(&self) -> &str {
        &self.company_name
    }

    pub fn company_type_id(&self) -> CompanyTypeId {
        self.company_type_id
    }

    pub fn province_id(&self) -> ProvinceId {
        self.province_id
    }

    pub fn submitted_by(&self) -> UserId {
        self.submitted_by
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn locked_by(&self) -> Option<UserId> {
        self.locked_by
    }

    pub fn locked_at(&self) -> Option<DateTime<Utc>> {
        self.locked_at
    }

    pub fn reservation_expiry_date(&self) -> Option<DateTime<Utc>> {
        self.reservation_expiry_date
    }

    pub fn registry_number(&self) -> Option<&str> {
        self.registry_number.as_deref()
    }

    pub fn registry_date(&self) -> Option<DateTime<Utc>> {
        self.registry_date
    }

    pub fn invoice_id(&self) -> Option<InvoiceId> {
        self.invoice_id
    }

    pub fn ip_expert_id(&self) -> Option<UserId> {
        self.ip_expert_id
    }

    pub fn ip_expert_feedback(&self) -> Option<&str> {
        self.ip_expert_feedback.as_deref()
    }

    pub fn ip_verdict(&self) -> Option<IpVerdict> {
        self.ip_verdict
    }

    pub fn auditor_feedback(&self) -> Option<&str> {
        self.auditor_feedback.as_deref()
    }

    pub fn leadership_feedback(&self) -> Option<&str> {
        self.leadership_feedback.as_deref()
    }

    /// Optimistic concurrency counter.
    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl TryFrom<RecordParts> for RequestRecord {
    type Error = ValidationError;

    fn try_from(parts: RecordParts) -> Result<Self, Self::Error> {
        Self::from_parts(parts)
    }
}

impl From<RequestRecord> for RecordParts {
    fn from(r: RequestRecord) -> Self {
        Self {
            id: r.id,
            company_name: r.company_name,
            company_type_id: r.company_type_id,
            province_id: r.province_id,
            submitted_by: r.submitted_by,
            status: r.status,
            locked_by: r.locked_by,
            locked_at: r.locked_at,
            reservation_expiry_date: r.reservation_expiry_date,
            registry_number: r.registry_number,
            registry_date: r.registry_date,
            invoice_id: r.invoice_id,
            ip_expert_id: r.ip_expert_id,
            ip_expert_feedback: r.ip_expert_feedback,
            ip_verdict: r.ip_verdict,
            auditor_feedback: r.auditor_feedback,
            leadership_feedback: r.leadership_feedback,
            version: r.version,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}
