//! # Workflow Engine
//!
//! The only entry point that changes a request's status. One `execute()`
//! call:
//!
//! 1. loads the record;
//! 2. applies the command through `RequestRecord::apply` (role gate, lock
//!    rule, transition table, payload check, field updates);
//! 3. commits the new record and its history entry in one version-checked
//!    store write (`ConcurrencyConflict` if someone else committed first);
//! 4. dispatches notifications best-effort, after the commit.
//!
//! A transition landing in `Accepted` is followed by the automatic system
//! `Reserve` transition as a second commit. If that second commit fails the
//! request stays `Accepted` and the sweeper's reservation pass retries it.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use cnr_core::{ActorContext, Clock, RequestId, Role, UserId, WorkflowConfig};
use cnr_state::{
    available_actions, ActionKind, ActionType, LockChange, NewRequest, RequestRecord,
    RequestStatus, TransitionOutcome, WorkflowCommand,
};

use crate::error::{Result, WorkflowError};
use crate::history::{ActionDraft, ChainVerification, HistoryLedger, HistoryView, RequestAction};
use crate::lock::LockManager;
use crate::notify::{deliver, Notification, NotificationDispatcher, NotificationKind, Recipient};
use crate::store::{Commit, RequestStore};

/// Note recorded on a sweeper cancellation.
pub const AUTO_CANCEL_NOTE: &str =
    "Reservation period elapsed without registry finalization; cancelled automatically.";

/// Orchestrates transitions, locks and history for registration requests.
pub struct WorkflowEngine {
    store: Arc<dyn RequestStore>,
    notifier: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    config: WorkflowConfig,
    locks: LockManager,
    ledger: HistoryLedger,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn RequestStore>,
        notifier: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            locks: LockManager::new(store.clone(), clock.clone()),
            ledger: HistoryLedger::new(store.clone()),
            store,
            notifier,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RequestStore> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<dyn NotificationDispatcher> {
        &self.notifier
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    // ─── Intake ──────────────────────────────────────────────────────

    /// Register a new request in `New` with its `Submitted` history entry.
    ///
    /// Only province intake (`Role::Submitter`) registers requests.
    pub async fn register(&self, request: NewRequest, actor: &ActorContext) -> Result<RequestRecord> {
        if actor.role() != Role::Submitter {
            return Err(WorkflowError::PermissionDenied {
                role: actor.role(),
                operation: "register a request".to_string(),
            });
        }
        request.validate()?;
        let draft = ActionDraft::new(actor, ActionType::Submitted, None, self.clock.now());
        let (record, _) = self.store.insert(request, draft).await?;
        tracing::info!(
            request_id = %record.id(),
            province = record.province_id().0,
            actor = %actor,
            "request registered"
        );
        Ok(record)
    }

    // ─── Transitions ─────────────────────────────────────────────────

    /// Execute a workflow command against request `id`.
    ///
    /// Returns the record as committed. Notification failures are logged
    /// and never surface here.
    pub async fn execute(&self, id: RequestId, command: WorkflowCommand, actor: &ActorContext) -> Result<RequestRecord> {
        let (mut record, outcome) = self.commit_transition(id, &command, actor).await?;
        self.notify_transition(&record, &outcome, &command).await;

        if record.status() == RequestStatus::Accepted {
            match self.reserve(id).await {
                Ok(reserved) => record = reserved,
                Err(e) => tracing::warn!(
                    request_id = %id,
                    error = %e,
                    "automatic reservation deferred to sweeper"
                ),
            }
        }
        Ok(record)
    }

    /// Run the automatic `Accepted → TemporarilyReserved` transition.
    pub async fn reserve(&self, id: RequestId) -> Result<RequestRecord> {
        let command = WorkflowCommand::new(ActionKind::Reserve);
        let (record, outcome) = self
            .commit_transition(id, &command, &ActorContext::system())
            .await?;
        self.notify_transition(&record, &outcome, &command).await;
        Ok(record)
    }

    async fn commit_transition(
        &self,
        id: RequestId,
        command: &WorkflowCommand,
        actor: &ActorContext,
    ) -> Result<(RequestRecord, TransitionOutcome)> {
        let result = self.try_commit_transition(id, command, actor).await;
        match &result {
            Ok((_, outcome)) => {
                metrics::counter!("cnr_transitions_total", "action" => outcome.action.as_str()).increment(1);
            }
            Err(e) => {
                metrics::counter!("cnr_transition_rejections_total", "code" => e.code()).increment(1);
                tracing::debug!(
                    request_id = %id,
                    action = %command.kind,
                    actor = %actor,
                    code = e.code(),
                    error = %e,
                    "transition refused"
                );
            }
        }
        result
    }

    async fn try_commit_transition(
        &self,
        id: RequestId,
        command: &WorkflowCommand,
        actor: &ActorContext,
    ) -> Result<(RequestRecord, TransitionOutcome)> {
        let now = self.clock.now();
        let mut record = self.store.load(id).await?.ok_or(WorkflowError::NotFound(id))?;
        let expected_version = record.version();

        let outcome = record
            .apply(command, actor, now, self.config.reservation_ttl)
            .map_err(|e| WorkflowError::from_transition(id, e))?;

        let draft = ActionDraft::transition(actor, command.kind, ledger_note(command, &record), now);
        self.store
            .commit(Commit {
                record: record.clone(),
                expected_version,
                entries: vec![draft],
            })
            .await?;

        tracing::info!(
            request_id = %id,
            action = %outcome.action,
            from = %outcome.from,
            to = %outcome.to,
            actor = %actor,
            "transition committed"
        );
        Ok((record, outcome))
    }

    async fn notify_transition(&self, record: &RequestRecord, outcome: &TransitionOutcome, command: &WorkflowCommand) {
        let Some((recipient, notification)) = notification_for(record, outcome, command) else {
            return;
        };
        deliver(
            self.notifier.as_ref(),
            self.store.as_ref(),
            recipient,
            notification,
            self.clock.now(),
        )
        .await;
    }

    // ─── Queries ─────────────────────────────────────────────────────

    /// Load a request.
    pub async fn get(&self, id: RequestId) -> Result<RequestRecord> {
        self.store.load(id).await?.ok_or(WorkflowError::NotFound(id))
    }

    /// History of a request, filtered for the given audience.
    pub async fn history(&self, id: RequestId, view: HistoryView) -> Result<Vec<RequestAction>> {
        self.ledger.list(id, view).await
    }

    /// Re-walk the request's history hash chain.
    pub async fn verify_history(&self, id: RequestId) -> Result<ChainVerification> {
        self.ledger.verify(id).await
    }

    /// Who holds the review lock on `id`.
    pub async fn current_lock_holder(&self, id: RequestId) -> Result<Option<UserId>> {
        self.locks.current_holder(id).await
    }

    /// Actions legal from `status`, straight from the transition table.
    pub fn available_actions(&self, status: RequestStatus) -> BTreeSet<ActionKind> {
        available_actions(status)
    }

    // ─── Locks ───────────────────────────────────────────────────────

    pub async fn acquire_lock(&self, id: RequestId, actor: &ActorContext) -> Result<LockChange> {
        self.locks.acquire(id, actor).await
    }

    pub async fn release_lock(&self, id: RequestId, actor: &ActorContext) -> Result<LockChange> {
        self.locks.release(id, actor).await
    }

    pub async fn force_release_lock(&self, id: RequestId, admin: &ActorContext) -> Result<LockChange> {
        self.locks.force_release(id, admin).await
    }
}

fn ledger_note(command: &WorkflowCommand, record: &RequestRecord) -> Option<String> {
    if let Some(note) = command.payload.note_text() {
        return Some(note.to_string());
    }
    match command.kind {
        ActionKind::Reserve => record
            .reservation_expiry_date()
            .map(|at| format!("Name reserved until {}", at.format("%Y-%m-%d %H:%M UTC"))),
        ActionKind::SweeperExpire => Some(AUTO_CANCEL_NOTE.to_string()),
        ActionKind::FinalizeRegistry => record
            .registry_number()
            .map(|n| format!("Entered into the registry as {n}")),
        ActionKind::Reject | ActionKind::SubmitTechnicalReport | ActionKind::MinisterDecision => {
            command.payload.feedback_text().map(str::to_string)
        }
        _ => None,
    }
}

/// Who hears about a committed transition, if anyone.
fn notification_for(
    record: &RequestRecord,
    outcome: &TransitionOutcome,
    command: &WorkflowCommand,
) -> Option<(Recipient, Notification)> {
    let id = record.id();
    let name = record.company_name();
    let applicant = || Recipient::Users(vec![record.submitted_by()]);
    // The auditor who took the request keeps its lock through IP review and
    // escalation; an unlocked request goes back to the auditor pool.
    let reviewer = || match record.locked_by() {
        Some(holder) => Recipient::Users(vec![holder]),
        None => Recipient::Role(Role::Auditor),
    };
    let status_changed = |body: String| {
        Notification::about(id, NotificationKind::StatusChanged, format!("{name}: {}", outcome.to), body)
    };

    match outcome.action {
        ActionKind::RequestIpReview => record.ip_expert_id().map(|expert| {
            (
                Recipient::Users(vec![expert]),
                Notification::about(
                    id,
                    NotificationKind::AssignedForReview,
                    format!("Technical review requested: {name}"),
                    "An auditor has requested your technical report on this name.",
                ),
            )
        }),
        ActionKind::ForwardLeadership | ActionKind::Forward => Some((
            Recipient::Role(Role::Director),
            Notification::about(
                id,
                NotificationKind::AssignedForReview,
                format!("Escalated for director review: {name}"),
                "A request has been escalated to the director.",
            ),
        )),
        ActionKind::DirectorForward => Some((
            Recipient::Role(Role::MinisterAssistant),
            Notification::about(
                id,
                NotificationKind::AssignedForReview,
                format!("Escalated for leadership response: {name}"),
                "The director has forwarded a request for a leadership response.",
            ),
        )),
        ActionKind::ApproveAwaitPayment => Some((
            applicant(),
            status_changed("Your name was approved. Pay the registration fee to reserve it.".to_string()),
        )),
        ActionKind::Reject => Some((
            applicant(),
            status_changed(
                command
                    .payload
                    .feedback_text()
                    .or(command.payload.note_text())
                    .unwrap_or("Your request was rejected.")
                    .to_string(),
            ),
        )),
        ActionKind::MinisterDecision => Some((
            applicant(),
            status_changed(record.leadership_feedback().unwrap_or("Leadership has responded.").to_string()),
        )),
        ActionKind::Reserve => record.reservation_expiry_date().map(|at| {
            (
                applicant(),
                status_changed(format!(
                    "Your name is reserved until {}. Complete registration before then.",
                    at.format("%Y-%m-%d")
                )),
            )
        }),
        ActionKind::FinalizeRegistry => Some((
            applicant(),
            status_changed(format!(
                "Your company was entered into the registry as {}.",
                record.registry_number().unwrap_or("-")
            )),
        )),
        ActionKind::SweeperExpire => Some((
            applicant(),
            Notification::about(
                id,
                NotificationKind::AutoCancelled,
                format!("Reservation cancelled: {name}"),
                AUTO_CANCEL_NOTE,
            ),
        )),
        ActionKind::StrikeOff => Some((
            applicant(),
            status_changed("Your company was struck off the registry.".to_string()),
        )),
        ActionKind::SubmitTechnicalReport => Some((
            reviewer(),
            Notification::about(
                id,
                NotificationKind::AssignedForReview,
                format!("Technical report received: {name}"),
                "The IP expert has submitted a technical report. The request is back in your queue.",
            ),
        )),
        ActionKind::DirectorReturn => Some((
            reviewer(),
            Notification::about(
                id,
                NotificationKind::AssignedForReview,
                format!("Returned by the director: {name}"),
                record
                    .leadership_feedback()
                    .unwrap_or("The director has returned the request for further auditing.")
                    .to_string(),
            ),
        )),
        ActionKind::Take | ActionKind::Return | ActionKind::ConfirmPayment => None,
    }
}
