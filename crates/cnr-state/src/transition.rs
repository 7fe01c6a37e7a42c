//! # Transition Table
//!
//! Every legal `(status, action)` pair and its target, as data. The
//! validator, `available_actions` and the exhaustive matrix test all read
//! this one table; nothing else in the workspace decides legality.

use std::collections::BTreeSet;

use cnr_core::Role;

use crate::action::ActionKind;
use crate::error::TransitionError;
use crate::status::RequestStatus;

/// One legal edge of the lifecycle graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    /// Status the request must be in.
    pub from: RequestStatus,
    /// Action driving the edge.
    pub action: ActionKind,
    /// Status the request lands in.
    pub to: RequestStatus,
}

const fn rule(from: RequestStatus, action: ActionKind, to: RequestStatus) -> TransitionRule {
    TransitionRule { from, action, to }
}

/// The complete lifecycle graph.
pub const TRANSITION_TABLE: [TransitionRule; 16] = {
    use ActionKind as A;
    use RequestStatus as S;
    [
        rule(S::New, A::Take, S::InAuditing),
        rule(S::InAuditing, A::RequestIpReview, S::PendingIpResponse),
        rule(S::InAuditing, A::ForwardLeadership, S::PendingDirectorReview),
        rule(S::InAuditing, A::ApproveAwaitPayment, S::AwaitingPayment),
        rule(S::InAuditing, A::Reject, S::Rejected),
        rule(S::PendingIpResponse, A::SubmitTechnicalReport, S::IpResponded),
        rule(S::IpResponded, A::Return, S::InAuditing),
        rule(S::IpResponded, A::Forward, S::PendingDirectorReview),
        rule(S::PendingDirectorReview, A::DirectorForward, S::PendingMinisterAssistantReview),
        rule(S::PendingDirectorReview, A::DirectorReturn, S::InAuditing),
        rule(S::PendingMinisterAssistantReview, A::MinisterDecision, S::LeadershipResponded),
        rule(S::AwaitingPayment, A::ConfirmPayment, S::Accepted),
        rule(S::Accepted, A::Reserve, S::TemporarilyReserved),
        rule(S::TemporarilyReserved, A::FinalizeRegistry, S::Finalized),
        rule(S::TemporarilyReserved, A::SweeperExpire, S::CancelledForNonCompletion),
        rule(S::Finalized, A::StrikeOff, S::CancelledByStriking),
    ]
};

/// Look up the rule for a `(status, action)` pair.
pub fn rule_for(from: RequestStatus, action: ActionKind) -> Option<&'static TransitionRule> {
    TRANSITION_TABLE
        .iter()
        .find(|r| r.from == from && r.action == action)
}

/// Check that `role` is the role `action` requires.
pub fn authorize(action: ActionKind, role: Role) -> Result<(), TransitionError> {
    if action.required_role() == role {
        Ok(())
    } else {
        Err(TransitionError::denied(role, action.as_str()))
    }
}

/// Resolve the target of `(status, action)` without a role check.
pub fn target(from: RequestStatus, action: ActionKind) -> Result<RequestStatus, TransitionError> {
    rule_for(from, action)
        .map(|r| r.to)
        .ok_or(TransitionError::InvalidTransition { from, action })
}

/// Validate a transition.
///
/// The role is checked first, so an actor with the wrong role is refused
/// with `PermissionDenied` whatever the current status. Pure: never touches
/// a record.
pub fn validate(
    status: RequestStatus,
    action: ActionKind,
    role: Role,
) -> Result<RequestStatus, TransitionError> {
    authorize(action, role)?;
    target(status, action)
}

/// Actions legal from `status`, in declaration order.
pub fn available_actions(status: RequestStatus) -> BTreeSet<ActionKind> {
    TRANSITION_TABLE
        .iter()
        .filter(|r| r.from == status)
        .map(|r| r.action)
        .collect()
}

/// Actions legal from `status` that `role` may perform.
pub fn available_actions_for(status: RequestStatus, role: Role) -> BTreeSet<ActionKind> {
    available_actions(status)
        .into_iter()
        .filter(|a| a.required_role() == role)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_pair_appears_at_most_once() {
        for (i, a) in TRANSITION_TABLE.iter().enumerate() {
            for b in &TRANSITION_TABLE[i + 1..] {
                assert!(
                    !(a.from == b.from && a.action == b.action),
                    "duplicate rule for ({}, {})",
                    a.from,
                    a.action
                );
            }
        }
    }

    #[test]
    fn terminal_statuses_have_no_outgoing_edges_except_strike_off() {
        for status in RequestStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            let actions = available_actions(status);
            if status == RequestStatus::Finalized {
                assert_eq!(actions.into_iter().collect::<Vec<_>>(), vec![ActionKind::StrikeOff]);
            } else {
                assert!(actions.is_empty(), "{status} should be a dead end");
            }
        }
    }

    #[test]
    fn every_non_terminal_status_has_an_exit() {
        for status in RequestStatus::ALL.into_iter().filter(|s| !s.is_terminal()) {
            assert!(!available_actions(status).is_empty(), "{status} has no exit");
        }
    }

    #[test]
    fn take_moves_new_into_auditing() {
        assert_eq!(
            validate(RequestStatus::New, ActionKind::Take, Role::Auditor),
            Ok(RequestStatus::InAuditing)
        );
    }

    #[test]
    fn wrong_role_is_denied_before_legality() {
        let err = validate(RequestStatus::TemporarilyReserved, ActionKind::FinalizeRegistry, Role::Auditor)
            .unwrap_err();
        assert_eq!(err.code(), "permission_denied");

        let err = validate(RequestStatus::New, ActionKind::FinalizeRegistry, Role::Auditor)
            .unwrap_err();
        assert_eq!(err.code(), "permission_denied");
    }

    #[test]
    fn finalize_outside_reservation_is_invalid() {
        assert_eq!(
            validate(RequestStatus::Accepted, ActionKind::FinalizeRegistry, Role::RegistryOfficer),
            Err(TransitionError::InvalidTransition {
                from: RequestStatus::Accepted,
                action: ActionKind::FinalizeRegistry,
            })
        );
    }

    #[test]
    fn sweeper_expire_is_system_only() {
        for role in Role::ALL.into_iter().filter(|r| *r != Role::System) {
            assert!(validate(RequestStatus::TemporarilyReserved, ActionKind::SweeperExpire, role).is_err());
        }
        assert_eq!(
            validate(RequestStatus::TemporarilyReserved, ActionKind::SweeperExpire, Role::System),
            Ok(RequestStatus::CancelledForNonCompletion)
        );
    }

    #[test]
    fn auditor_options_while_auditing() {
        let actions = available_actions_for(RequestStatus::InAuditing, Role::Auditor);
        assert_eq!(
            actions.into_iter().collect::<Vec<_>>(),
            vec![
                ActionKind::RequestIpReview,
                ActionKind::ForwardLeadership,
                ActionKind::ApproveAwaitPayment,
                ActionKind::Reject,
            ]
        );
        assert!(available_actions_for(RequestStatus::InAuditing, Role::Director).is_empty());
    }
}
