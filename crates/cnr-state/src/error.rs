//! Errors raised when a workflow action is refused.

use thiserror::Error;

use cnr_core::{Role, UserId};

use crate::action::ActionKind;
use crate::status::RequestStatus;

/// Why the review lock refused an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDenial {
    /// Another reviewer holds the lock.
    HeldByOther {
        /// The current holder.
        holder: UserId,
    },
    /// The action requires the lock but nobody holds it.
    NotHeld,
    /// Terminal requests can never be locked.
    Terminal {
        /// The request's terminal status.
        status: RequestStatus,
    },
}

impl std::fmt::Display for LockDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HeldByOther { holder } => write!(f, "lock is held by {holder}"),
            Self::NotHeld => f.write_str("the caller does not hold the lock"),
            Self::Terminal { status } => write!(f, "request is terminal ({status})"),
        }
    }
}

/// A refused transition or lock operation.
///
/// Returned before any state is touched: a refused action never leaves a
/// partially mutated record behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// The actor's role may not perform the operation.
    #[error("permission denied: role {role} may not {operation}")]
    PermissionDenied {
        /// The actor's role.
        role: Role,
        /// What was attempted.
        operation: String,
    },

    /// The review lock refused the operation.
    #[error("lock denied: {0}")]
    LockDenied(LockDenial),

    /// The action is not legal from the current status.
    #[error("invalid transition: {action} is not allowed from {from}")]
    InvalidTransition {
        /// Current status.
        from: RequestStatus,
        /// Attempted action.
        action: ActionKind,
    },

    /// A required payload field is missing or blank.
    #[error("validation failed: {action} requires {field}")]
    ValidationFailed {
        /// Attempted action.
        action: ActionKind,
        /// The missing field.
        field: &'static str,
    },

    /// A deadline computed for the action does not fit in a timestamp.
    #[error("{action} deadline is out of range")]
    DeadlineOutOfRange {
        /// Attempted action.
        action: ActionKind,
    },
}

impl TransitionError {
    pub(crate) fn denied(role: Role, operation: impl Into<String>) -> Self {
        Self::PermissionDenied {
            role,
            operation: operation.into(),
        }
    }

    /// Stable snake_case code for logs and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied { .. } => "permission_denied",
            Self::LockDenied(_) => "lock_denied",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::ValidationFailed { .. } | Self::DeadlineOutOfRange { .. } => "validation_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_pair() {
        let err = TransitionError::InvalidTransition {
            from: RequestStatus::New,
            action: ActionKind::FinalizeRegistry,
        };
        assert_eq!(
            err.to_string(),
            "invalid transition: finalize_registry is not allowed from NEW"
        );
        assert_eq!(err.code(), "invalid_transition");
    }

    #[test]
    fn lock_denial_names_holder() {
        let holder = UserId::new();
        let err = TransitionError::LockDenied(LockDenial::HeldByOther { holder });
        assert!(err.to_string().contains(&holder.to_string()));
    }
}
