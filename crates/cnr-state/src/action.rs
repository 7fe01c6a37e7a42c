//! # Workflow Actions
//!
//! The closed set of actions that move a request between statuses, the
//! payload they carry, and the action types recorded in the history ledger.
//!
//! Every per-action property (required role, lock policy, lock effect,
//! submitter visibility) is an exhaustive `match` here, so adding an action
//! forces every property to be decided.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cnr_core::{InvoiceId, Role, UserId, ValidationError};

use crate::error::TransitionError;

// ─── Action Kind ─────────────────────────────────────────────────────

/// An action that drives a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Auditor claims a new request for review.
    Take,
    /// Auditor asks an IP expert for a technical report.
    RequestIpReview,
    /// Auditor escalates straight to the director.
    ForwardLeadership,
    /// Auditor approves the name pending fee payment.
    ApproveAwaitPayment,
    /// Auditor rejects the request.
    Reject,
    /// IP expert answers with a technical report.
    SubmitTechnicalReport,
    /// Auditor takes the answered request back into auditing.
    Return,
    /// Auditor escalates an answered request to the director.
    Forward,
    /// Director escalates to the minister's assistant.
    DirectorForward,
    /// Director sends the request back to auditing.
    DirectorReturn,
    /// Minister's assistant records the leadership response.
    MinisterDecision,
    /// Payment clerk confirms the fee has been paid.
    ConfirmPayment,
    /// Automatic reservation stamped after acceptance.
    Reserve,
    /// Registry officer enters the name into the registry.
    FinalizeRegistry,
    /// Sweeper cancels a reservation whose deadline passed.
    SweeperExpire,
    /// Administrator strikes a finalized entry off the registry.
    StrikeOff,
}

/// How an action interacts with the request's exclusive review lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPolicy {
    /// The actor acquires the lock as part of the transition.
    Acquire,
    /// The actor must already hold the lock.
    RequireHolder,
    /// The lock is not consulted.
    Exempt,
    /// System override: the transition proceeds whoever holds the lock.
    SystemOverride,
}

/// What happens to the lock after a successful transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockEffect {
    /// Lock fields are left as they are.
    Keep,
    /// Lock fields are cleared.
    Release,
}

impl ActionKind {
    /// Every action, in declaration order.
    pub const ALL: [ActionKind; 16] = [
        ActionKind::Take,
        ActionKind::RequestIpReview,
        ActionKind::ForwardLeadership,
        ActionKind::ApproveAwaitPayment,
        ActionKind::Reject,
        ActionKind::SubmitTechnicalReport,
        ActionKind::Return,
        ActionKind::Forward,
        ActionKind::DirectorForward,
        ActionKind::DirectorReturn,
        ActionKind::MinisterDecision,
        ActionKind::ConfirmPayment,
        ActionKind::Reserve,
        ActionKind::FinalizeRegistry,
        ActionKind::SweeperExpire,
        ActionKind::StrikeOff,
    ];

    /// Return the snake_case name used on the wire and in metrics labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Take => "take",
            Self::RequestIpReview => "request_ip_review",
            Self::ForwardLeadership => "forward_leadership",
            Self::ApproveAwaitPayment => "approve_await_payment",
            Self::Reject => "reject",
            Self::SubmitTechnicalReport => "submit_technical_report",
            Self::Return => "return",
            Self::Forward => "forward",
            Self::DirectorForward => "director_forward",
            Self::DirectorReturn => "director_return",
            Self::MinisterDecision => "minister_decision",
            Self::ConfirmPayment => "confirm_payment",
            Self::Reserve => "reserve",
            Self::FinalizeRegistry => "finalize_registry",
            Self::SweeperExpire => "sweeper_expire",
            Self::StrikeOff => "strike_off",
        }
    }

    /// The only role allowed to perform this action.
    pub fn required_role(&self) -> Role {
        match self {
            Self::Take
            | Self::RequestIpReview
            | Self::ForwardLeadership
            | Self::ApproveAwaitPayment
            | Self::Reject
            | Self::Return
            | Self::Forward => Role::Auditor,
            Self::SubmitTechnicalReport => Role::IpExpert,
            Self::DirectorForward | Self::DirectorReturn => Role::Director,
            Self::MinisterDecision => Role::MinisterAssistant,
            Self::ConfirmPayment => Role::PaymentClerk,
            Self::FinalizeRegistry => Role::RegistryOfficer,
            Self::StrikeOff => Role::Admin,
            Self::Reserve | Self::SweeperExpire => Role::System,
        }
    }

    /// Lock ownership requirement checked before the transition.
    pub fn lock_policy(&self) -> LockPolicy {
        match self {
            Self::Take => LockPolicy::Acquire,
            Self::RequestIpReview
            | Self::ForwardLeadership
            | Self::ApproveAwaitPayment
            | Self::Reject
            | Self::Return
            | Self::Forward => LockPolicy::RequireHolder,
            Self::SubmitTechnicalReport
            | Self::DirectorForward
            | Self::DirectorReturn
            | Self::MinisterDecision
            | Self::ConfirmPayment
            | Self::Reserve
            | Self::FinalizeRegistry
            | Self::StrikeOff => LockPolicy::Exempt,
            Self::SweeperExpire => LockPolicy::SystemOverride,
        }
    }

    /// Lock handling after the transition commits.
    pub fn lock_effect(&self) -> LockEffect {
        match self {
            Self::ApproveAwaitPayment
            | Self::Reject
            | Self::MinisterDecision
            | Self::FinalizeRegistry
            | Self::SweeperExpire
            | Self::StrikeOff => LockEffect::Release,
            Self::Take
            | Self::RequestIpReview
            | Self::ForwardLeadership
            | Self::SubmitTechnicalReport
            | Self::Return
            | Self::Forward
            | Self::DirectorForward
            | Self::DirectorReturn
            | Self::ConfirmPayment
            | Self::Reserve => LockEffect::Keep,
        }
    }

    /// Whether the ledger entry is hidden from the submitter-facing view.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::RequestIpReview
                | Self::ForwardLeadership
                | Self::SubmitTechnicalReport
                | Self::Return
                | Self::Forward
                | Self::DirectorForward
                | Self::DirectorReturn
        )
    }

    /// Label recorded as the history entry's action type.
    pub fn ledger_label(&self) -> &'static str {
        match self {
            Self::Take => "Take",
            Self::RequestIpReview => "RequestIpReview",
            Self::ForwardLeadership => "ForwardLeadership",
            Self::ApproveAwaitPayment => "ApproveAwaitPayment",
            Self::Reject => "Reject",
            Self::SubmitTechnicalReport => "SubmitTechnicalReport",
            Self::Return => "Return",
            Self::Forward => "Forward",
            Self::DirectorForward => "DirectorForward",
            Self::DirectorReturn => "DirectorReturn",
            Self::MinisterDecision => "MinisterDecision",
            Self::ConfirmPayment => "ConfirmPayment",
            Self::Reserve => "Reserved",
            Self::FinalizeRegistry => "FinalizeRegistry",
            Self::SweeperExpire => "AutoCancelled",
            Self::StrikeOff => "StrikeOff",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| ValidationError::UnknownValue {
                kind: "action",
                value: s.to_string(),
            })
    }
}

// ─── IP Verdict ──────────────────────────────────────────────────────

/// The IP expert's conclusion about conflicts with existing marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpVerdict {
    /// No conflicting registered mark found.
    NoConflict,
    /// Similar marks exist; registration is possible with caution.
    PossibleConflict,
    /// The name conflicts with a protected mark.
    Conflict,
}

impl IpVerdict {
    /// Return the stored string value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoConflict => "no_conflict",
            Self::PossibleConflict => "possible_conflict",
            Self::Conflict => "conflict",
        }
    }
}

impl FromStr for IpVerdict {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::NoConflict, Self::PossibleConflict, Self::Conflict]
            .into_iter()
            .find(|v| v.as_str() == s.trim())
            .ok_or_else(|| ValidationError::UnknownValue {
                kind: "ip verdict",
                value: s.to_string(),
            })
    }
}

// ─── Command and Payload ─────────────────────────────────────────────

/// Action-specific data supplied by the caller.
///
/// Fields are optional because calling layers decode them from untrusted
/// input; [`ActionPayload::validate_for`] enforces what each action needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPayload {
    /// Free-text note recorded in the history entry.
    #[serde(default)]
    pub note: Option<String>,
    /// Reviewer feedback stored on the request.
    #[serde(default)]
    pub feedback: Option<String>,
    /// IP expert to assign (`request_ip_review`).
    #[serde(default)]
    pub ip_expert_id: Option<UserId>,
    /// IP expert verdict (`submit_technical_report`).
    #[serde(default)]
    pub ip_verdict: Option<IpVerdict>,
    /// Registry number (`finalize_registry`).
    #[serde(default)]
    pub registry_number: Option<String>,
    /// Registry date; defaults to the transition time.
    #[serde(default)]
    pub registry_date: Option<DateTime<Utc>>,
    /// Paid invoice (`confirm_payment`).
    #[serde(default)]
    pub invoice_id: Option<InvoiceId>,
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.trim().is_empty())
}

impl ActionPayload {
    /// Check that every field `action` requires is present and non-blank.
    pub fn validate_for(&self, action: ActionKind) -> Result<(), TransitionError> {
        let missing = |field: &'static str| TransitionError::ValidationFailed { action, field };
        match action {
            ActionKind::RequestIpReview if self.ip_expert_id.is_none() => Err(missing("ip_expert_id")),
            ActionKind::SubmitTechnicalReport if !present(&self.feedback) => Err(missing("feedback")),
            ActionKind::Reject if !present(&self.feedback) && !present(&self.note) => {
                Err(missing("feedback"))
            }
            ActionKind::MinisterDecision if !present(&self.feedback) => Err(missing("feedback")),
            ActionKind::ConfirmPayment if self.invoice_id.is_none() => Err(missing("invoice_id")),
            ActionKind::FinalizeRegistry if !present(&self.registry_number) => {
                Err(missing("registry_number"))
            }
            _ => Ok(()),
        }
    }

    /// The trimmed note, if any.
    pub fn note_text(&self) -> Option<&str> {
        self.note.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// The trimmed feedback, if any.
    pub fn feedback_text(&self) -> Option<&str> {
        self.feedback.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// A requested action plus its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowCommand {
    /// The action to perform.
    pub kind: ActionKind,
    /// Action-specific data.
    #[serde(default)]
    pub payload: ActionPayload,
}

impl WorkflowCommand {
    /// A command with an empty payload.
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            payload: ActionPayload::default(),
        }
    }

    /// Builder: attach a history note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.payload.note = Some(note.into());
        self
    }

    /// Builder: attach reviewer feedback.
    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.payload.feedback = Some(feedback.into());
        self
    }

    /// Builder: assign an IP expert.
    pub fn with_ip_expert(mut self, expert: UserId) -> Self {
        self.payload.ip_expert_id = Some(expert);
        self
    }

    /// Builder: set the IP verdict.
    pub fn with_ip_verdict(mut self, verdict: IpVerdict) -> Self {
        self.payload.ip_verdict = Some(verdict);
        self
    }

    /// Builder: set the registry number.
    pub fn with_registry_number(mut self, number: impl Into<String>) -> Self {
        self.payload.registry_number = Some(number.into());
        self
    }

    /// Builder: set an explicit registry date.
    pub fn with_registry_date(mut self, date: DateTime<Utc>) -> Self {
        self.payload.registry_date = Some(date);
        self
    }

    /// Builder: link the paid invoice.
    pub fn with_invoice(mut self, invoice: InvoiceId) -> Self {
        self.payload.invoice_id = Some(invoice);
        self
    }
}

// ─── Ledger Action Type ──────────────────────────────────────────────

/// The kind of event recorded in a history entry.
///
/// Serialized as its ledger label (`"Take"`, `"AutoCancelled"`, ...), the
/// same string stored in the `action_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ActionType {
    /// Request registered by intake.
    Submitted,
    /// A status transition.
    Transition(ActionKind),
    /// A reviewer acquired the lock outside a transition.
    LockAcquired,
    /// The holder released the lock.
    LockReleased,
    /// An administrator cleared another user's lock.
    LockForceReleased,
}

impl ActionType {
    /// The stored label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Submitted => "Submitted",
            Self::Transition(kind) => kind.ledger_label(),
            Self::LockAcquired => "LockAcquired",
            Self::LockReleased => "LockReleased",
            Self::LockForceReleased => "LockForceReleased",
        }
    }

    /// Decode a stored label.
    pub fn parse(label: &str) -> Result<Self, ValidationError> {
        match label {
            "Submitted" => Ok(Self::Submitted),
            "LockAcquired" => Ok(Self::LockAcquired),
            "LockReleased" => Ok(Self::LockReleased),
            "LockForceReleased" => Ok(Self::LockForceReleased),
            other => ActionKind::ALL
                .into_iter()
                .find(|k| k.ledger_label() == other)
                .map(Self::Transition)
                .ok_or_else(|| ValidationError::UnknownValue {
                    kind: "action type",
                    value: other.to_string(),
                }),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl From<ActionType> for String {
    fn from(value: ActionType) -> Self {
        value.label().to_string()
    }
}

impl TryFrom<String> for ActionType {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_actions_are_system_only() {
        assert_eq!(ActionKind::Reserve.required_role(), Role::System);
        assert_eq!(ActionKind::SweeperExpire.required_role(), Role::System);
        assert_eq!(ActionKind::SweeperExpire.lock_policy(), LockPolicy::SystemOverride);
    }

    #[test]
    fn payment_confirmation_is_lock_exempt() {
        assert_eq!(ActionKind::ConfirmPayment.lock_policy(), LockPolicy::Exempt);
    }

    #[test]
    fn action_name_roundtrip() {
        for kind in ActionKind::ALL {
            assert_eq!(kind.as_str().parse::<ActionKind>().unwrap(), kind);
        }
        assert_eq!("director-forward".parse::<ActionKind>().unwrap(), ActionKind::DirectorForward);
    }

    #[test]
    fn ledger_labels_are_unique_and_parse_back() {
        for kind in ActionKind::ALL {
            let ty = ActionType::Transition(kind);
            assert_eq!(ActionType::parse(ty.label()).unwrap(), ty);
        }
        let mut labels: Vec<&str> = ActionKind::ALL.iter().map(|k| k.ledger_label()).collect();
        labels.extend(["Submitted", "LockAcquired", "LockReleased", "LockForceReleased"]);
        let count = labels.len();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), count);
    }

    #[test]
    fn sweeper_expire_is_recorded_as_auto_cancelled() {
        let json = serde_json::to_string(&ActionType::Transition(ActionKind::SweeperExpire)).unwrap();
        assert_eq!(json, "\"AutoCancelled\"");
        let back: ActionType = serde_json::from_str("\"AutoCancelled\"").unwrap();
        assert_eq!(back, ActionType::Transition(ActionKind::SweeperExpire));
    }

    #[test]
    fn finalize_requires_registry_number() {
        let payload = ActionPayload::default();
        assert_eq!(
            payload.validate_for(ActionKind::FinalizeRegistry),
            Err(TransitionError::ValidationFailed {
                action: ActionKind::FinalizeRegistry,
                field: "registry_number"
            })
        );
        let blank = WorkflowCommand::new(ActionKind::FinalizeRegistry).with_registry_number("   ");
        assert!(blank.payload.validate_for(ActionKind::FinalizeRegistry).is_err());
        let ok = WorkflowCommand::new(ActionKind::FinalizeRegistry).with_registry_number("REG-1");
        assert!(ok.payload.validate_for(ActionKind::FinalizeRegistry).is_ok());
    }

    #[test]
    fn reject_accepts_note_or_feedback_as_reason() {
        let with_note = WorkflowCommand::new(ActionKind::Reject).with_note("duplicate name");
        assert!(with_note.payload.validate_for(ActionKind::Reject).is_ok());
        let with_feedback = WorkflowCommand::new(ActionKind::Reject).with_feedback("offensive");
        assert!(with_feedback.payload.validate_for(ActionKind::Reject).is_ok());
        assert!(ActionPayload::default().validate_for(ActionKind::Reject).is_err());
    }

    #[test]
    fn take_needs_no_payload() {
        assert!(ActionPayload::default().validate_for(ActionKind::Take).is_ok());
    }
}
