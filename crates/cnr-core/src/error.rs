//! # Error Types
//!
//! Validation and configuration errors for the foundational types, built
//! with `thiserror`. Each variant carries the offending input so operators
//! can diagnose bad data without guesswork.

use thiserror::Error;

/// Validation errors for identifiers, roles and stored codes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Request identifiers are positive integers.
    #[error("invalid request id: \"{0}\" (expected a positive integer)")]
    InvalidRequestId(String),

    /// User identifiers are UUIDs.
    #[error("invalid user id: \"{0}\" (expected a UUID)")]
    InvalidUserId(String),

    /// Role name not in the closed catalog.
    #[error("unknown role: \"{0}\"")]
    UnknownRole(String),

    /// A human actor attempted to present the reserved system role.
    #[error("the system role cannot be assigned to a user")]
    SystemRoleForUser,

    /// Stored status code outside the 14-value catalog.
    #[error("unknown request status: \"{0}\"")]
    UnknownStatus(String),

    /// Stored value that does not match any known variant.
    #[error("unknown {kind}: \"{value}\"")]
    UnknownValue {
        /// Which catalog was being decoded.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// A persisted record violates a structural invariant.
    #[error("record invariant violated: {0}")]
    Invariant(String),
}

/// Errors while loading workflow configuration from the environment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The variable is set but does not parse as the expected number.
    #[error("{var} must be a {expected}, got \"{value}\"")]
    Malformed {
        /// Environment variable name.
        var: &'static str,
        /// Human-readable expected format.
        expected: &'static str,
        /// The raw value.
        value: String,
    },

    /// The value parses but is outside the permitted range.
    #[error("{var} out of range: {reason}")]
    OutOfRange {
        /// Environment variable name.
        var: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}
