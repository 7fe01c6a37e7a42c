//! Error types for the workflow layer.
//!
//! `WorkflowError` is the taxonomy returned to calling layers. Notification
//! failures never appear here: they are caught and logged at the dispatch
//! boundary (see [`crate::notify`]).

use thiserror::Error;

use cnr_core::{RequestId, Role, ValidationError};
use cnr_state::{ActionKind, LockDenial, RequestStatus, TransitionError};

/// Result type alias using the workflow error type.
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Errors raised by a store adapter.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The record changed since it was loaded.
    #[error("version conflict on {id}: expected version {expected}")]
    VersionConflict { id: RequestId, expected: i64 },

    /// The record does not exist.
    #[error("request not found: {0}")]
    NotFound(RequestId),

    /// A stored row could not be decoded into a valid record.
    #[error("corrupt row for {id}: {source}")]
    Corrupt {
        id: RequestId,
        #[source]
        source: ValidationError,
    },

    /// Database driver error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Embedded migrations failed to apply.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Main error type for workflow operations.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// The review lock is held by someone else, or the caller lacks it.
    #[error("lock denied on {request_id}: {denial}")]
    LockDenied {
        request_id: RequestId,
        denial: LockDenial,
    },

    /// The action is illegal from the request's current status.
    #[error("invalid transition on {request_id}: {action} is not allowed from {from}")]
    InvalidTransition {
        request_id: RequestId,
        from: RequestStatus,
        action: ActionKind,
    },

    /// The actor's role is insufficient, regardless of transition legality.
    #[error("permission denied: role {role} may not {operation}")]
    PermissionDenied { role: Role, operation: String },

    /// The record changed between load and commit; the caller should retry.
    #[error("concurrency conflict on {0}: the request changed, reload and retry")]
    ConcurrencyConflict(RequestId),

    /// Required payload or intake data missing or malformed.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// The request does not exist.
    #[error("request not found: {0}")]
    NotFound(RequestId),

    /// The persistence collaborator failed.
    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl WorkflowError {
    /// Attach the request id to a refused transition.
    pub fn from_transition(request_id: RequestId, err: TransitionError) -> Self {
        match err {
            TransitionError::PermissionDenied { role, operation } => {
                Self::PermissionDenied { role, operation }
            }
            TransitionError::LockDenied(denial) => Self::LockDenied { request_id, denial },
            TransitionError::InvalidTransition { from, action } => Self::InvalidTransition {
                request_id,
                from,
                action,
            },
            TransitionError::ValidationFailed { action, field } => {
                Self::ValidationFailed(format!("{action} on {request_id} requires {field}"))
            }
            TransitionError::DeadlineOutOfRange { action } => {
                Self::ValidationFailed(format!("{action} on {request_id}: deadline out of range"))
            }
        }
    }

    /// Stable machine-readable code, for transport mapping and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            Self::LockDenied { .. } => "lock_denied",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::ConcurrencyConflict(_) => "concurrency_conflict",
            Self::ValidationFailed(_) => "validation_failed",
            Self::NotFound(_) => "not_found",
            Self::Storage(_) => "storage",
        }
    }

    /// Whether retrying after a reload may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict(_))
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { id, .. } => Self::ConcurrencyConflict(id),
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Storage(other),
        }
    }
}

impl From<ValidationError> for WorkflowError {
    fn from(err: ValidationError) -> Self {
        Self::ValidationFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_conflict_maps_to_retryable_conflict() {
        let err: WorkflowError = StoreError::VersionConflict {
            id: RequestId(9),
            expected: 3,
        }
        .into();
        assert_eq!(err.code(), "concurrency_conflict");
        assert!(err.is_retryable());
    }

    #[test]
    fn transition_errors_keep_request_context() {
        let err = WorkflowError::from_transition(
            RequestId(7),
            TransitionError::InvalidTransition {
                from: RequestStatus::New,
                action: ActionKind::FinalizeRegistry,
            },
        );
        assert_eq!(err.code(), "invalid_transition");
        assert!(err.to_string().contains("request:7"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn validation_failure_names_field() {
        let err = WorkflowError::from_transition(
            RequestId(3),
            TransitionError::ValidationFailed {
                action: ActionKind::FinalizeRegistry,
                field: "registry_number",
            },
        );
        assert_eq!(err.code(), "validation_failed");
        assert!(err.to_string().contains("registry_number"));
    }
}
