//! # Domain Identity Newtypes
//!
//! Newtype wrappers for the identifiers the registry workflow handles.
//! These prevent accidental identifier confusion: a `RequestId` cannot be
//! passed where an `InvoiceId` is expected even though both are integers.
//!
//! Request, invoice, province and company-type identifiers are database
//! serials. User identifiers are UUIDs issued by the external identity
//! provider.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Identifier of a company-name registration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub i64);

/// Identifier of a human actor (applicant, reviewer, officer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

/// Identifier of a payment invoice linked on payment confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub i64);

/// Identifier of the province that performed intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvinceId(pub i32);

/// Identifier of the legal company type (LLC, joint-stock, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyTypeId(pub i32);

impl RequestId {
    /// Access the inner serial value.
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl UserId {
    /// Generate a new random user identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for RequestId {
    type Err = ValidationError;

    /// Accepts a bare serial (`42`) or the display form (`request:42`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let raw = raw.strip_prefix("request:").unwrap_or(raw);
        match raw.parse::<i64>() {
            Ok(n) if n > 0 => Ok(Self(n)),
            _ => Err(ValidationError::InvalidRequestId(s.to_string())),
        }
    }
}

impl FromStr for UserId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ValidationError::InvalidUserId(s.to_string()))
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "request:{}", self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user:{}", self.0)
    }
}

impl std::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invoice:{}", self.0)
    }
}
