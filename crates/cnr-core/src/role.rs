//! # Roles and Actor Context
//!
//! The closed catalog of roles that may act on a registration request, and
//! the `ActorContext` the calling layer passes into every workflow call.
//!
//! Authentication is external. By the time an `ActorContext` reaches the
//! workflow core the caller's identity and role have already been
//! established; the core only decides whether that role may perform the
//! requested action.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::UserId;

/// A reviewer or officer role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Province intake clerk who registers new requests.
    Submitter,
    /// Central auditor who takes and reviews requests.
    Auditor,
    /// Intellectual-property expert consulted on name conflicts.
    IpExpert,
    /// Director deciding escalated requests.
    Director,
    /// Minister's assistant giving the final leadership response.
    MinisterAssistant,
    /// Clerk confirming fee payments.
    PaymentClerk,
    /// Registry officer finalizing reserved names into the registry.
    RegistryOfficer,
    /// Administrator (strike-off, lock override).
    Admin,
    /// The background sweeper. Never held by a human.
    System,
}

impl Role {
    /// Every role, in catalog order.
    pub const ALL: [Role; 9] = [
        Role::Submitter,
        Role::Auditor,
        Role::IpExpert,
        Role::Director,
        Role::MinisterAssistant,
        Role::PaymentClerk,
        Role::RegistryOfficer,
        Role::Admin,
        Role::System,
    ];

    /// Return the string value used in storage and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitter => "submitter",
            Self::Auditor => "auditor",
            Self::IpExpert => "ip_expert",
            Self::Director => "director",
            Self::MinisterAssistant => "minister_assistant",
            Self::PaymentClerk => "payment_clerk",
            Self::RegistryOfficer => "registry_officer",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::UnknownRole(s.to_string()))
    }
}

/// Who is performing a workflow call.
///
/// Human actors always carry a `UserId`. The system actor has none and is
/// the only context allowed to hold `Role::System`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    user_id: Option<UserId>,
    role: Role,
}

impl ActorContext {
    /// Build the context for an authenticated human actor.
    ///
    /// Returns an error if `role` is `Role::System`.
    pub fn user(user_id: UserId, role: Role) -> Result<Self, ValidationError> {
        if role == Role::System {
            return Err(ValidationError::SystemRoleForUser);
        }
        Ok(Self {
            user_id: Some(user_id),
            role,
        })
    }

    /// The background system actor used by the sweeper and automatic
    /// transitions.
    pub fn system() -> Self {
        Self {
            user_id: None,
            role: Role::System,
        }
    }

    /// The acting user, or `None` for the system actor.
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    /// The role the actor is acting under.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether this is the system actor.
    pub fn is_system(&self) -> bool {
        self.user_id.is_none()
    }
}

impl std::fmt::Display for ActorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.user_id {
            Some(id) => write!(f, "{id} ({})", self.role),
            None => f.write_str("system"),
        }
    }
}
