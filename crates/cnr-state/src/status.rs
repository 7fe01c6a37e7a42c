//! # Request Status Catalog
//!
//! The closed set of 14 lifecycle statuses a registration request can be in.
//! Each status has a stable numeric code used by persistence; the code is
//! never interpreted anywhere else.
//!
//! ```text
//! NEW ──take──▶ IN_AUDITING ──request_ip_review──▶ PENDING_IP_RESPONSE
//!                 │  ▲   ▲                               │
//!                 │  │   └───return── IP_RESPONDED ◀──submit_technical_report
//!                 │  │                   │
//!                 │  └─director_return─┐ └─forward─┐
//!                 ├─forward_leadership─▶ PENDING_DIRECTOR_REVIEW
//!                 │                      │ director_forward
//!                 │                      ▼
//!                 │        PENDING_MINISTER_ASSISTANT_REVIEW ──▶ LEADERSHIP_RESPONDED
//!                 ├─reject──▶ REJECTED
//!                 └─approve_await_payment──▶ AWAITING_PAYMENT ──confirm_payment──▶ ACCEPTED
//!                                                                                   │ (automatic)
//!                                                                                   ▼
//!        CANCELLED_FOR_NON_COMPLETION ◀──sweeper_expire── TEMPORARILY_RESERVED
//!                                                          │ finalize_registry
//!                                                          ▼
//!                                    CANCELLED_BY_STRIKING ◀──strike_off── FINALIZED
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use cnr_core::ValidationError;

/// Lifecycle status of a registration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Registered by province intake, not yet taken by an auditor.
    New,
    /// An auditor holds the request and is reviewing it.
    InAuditing,
    /// Waiting on the assigned IP expert's technical report.
    PendingIpResponse,
    /// The IP expert has answered; back with the auditor.
    IpResponded,
    /// Payment confirmed; reservation is stamped automatically.
    Accepted,
    /// Rejected by the auditor (terminal).
    Rejected,
    /// Approved, waiting for the applicant to pay the fee.
    AwaitingPayment,
    /// Escalated to the director.
    PendingDirectorReview,
    /// Escalated further to the minister's assistant.
    PendingMinisterAssistantReview,
    /// Name reserved until the reservation deadline.
    TemporarilyReserved,
    /// Reservation lapsed without finalization (terminal).
    CancelledForNonCompletion,
    /// Entered into the company registry (terminal for review).
    Finalized,
    /// Registry entry struck off by an administrator (terminal).
    CancelledByStriking,
    /// Leadership has given its response (terminal).
    LeadershipResponded,
}

impl RequestStatus {
    /// Every status, in code order.
    pub const ALL: [RequestStatus; 14] = [
        RequestStatus::New,
        RequestStatus::InAuditing,
        RequestStatus::PendingIpResponse,
        RequestStatus::IpResponded,
        RequestStatus::Accepted,
        RequestStatus::Rejected,
        RequestStatus::AwaitingPayment,
        RequestStatus::PendingDirectorReview,
        RequestStatus::PendingMinisterAssistantReview,
        RequestStatus::TemporarilyReserved,
        RequestStatus::CancelledForNonCompletion,
        RequestStatus::Finalized,
        RequestStatus::CancelledByStriking,
        RequestStatus::LeadershipResponded,
    ];

    /// Stable numeric code stored in the `status_id` column.
    pub fn code(&self) -> i16 {
        match self {
            Self::New => 1,
            Self::InAuditing => 2,
            Self::PendingIpResponse => 3,
            Self::IpResponded => 4,
            Self::Accepted => 5,
            Self::Rejected => 6,
            Self::AwaitingPayment => 7,
            Self::PendingDirectorReview => 8,
            Self::PendingMinisterAssistantReview => 9,
            Self::TemporarilyReserved => 10,
            Self::CancelledForNonCompletion => 11,
            Self::Finalized => 12,
            Self::CancelledByStriking => 13,
            Self::LeadershipResponded => 14,
        }
    }

    /// Decode a stored status code.
    pub fn from_code(code: i16) -> Result<Self, ValidationError> {
        Self::ALL
            .into_iter()
            .find(|s| s.code() == code)
            .ok_or_else(|| ValidationError::UnknownStatus(code.to_string()))
    }

    /// Whether the request has left active review.
    ///
    /// Terminal requests can never be locked. `Finalized` is terminal but
    /// still admits the administrative strike-off.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected
                | Self::CancelledForNonCompletion
                | Self::Finalized
                | Self::CancelledByStriking
                | Self::LeadershipResponded
        )
    }

    /// Return the canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::InAuditing => "IN_AUDITING",
            Self::PendingIpResponse => "PENDING_IP_RESPONSE",
            Self::IpResponded => "IP_RESPONDED",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
            Self::AwaitingPayment => "AWAITING_PAYMENT",
            Self::PendingDirectorReview => "PENDING_DIRECTOR_REVIEW",
            Self::PendingMinisterAssistantReview => "PENDING_MINISTER_ASSISTANT_REVIEW",
            Self::TemporarilyReserved => "TEMPORARILY_RESERVED",
            Self::CancelledForNonCompletion => "CANCELLED_FOR_NON_COMPLETION",
            Self::Finalized => "FINALIZED",
            Self::CancelledByStriking => "CANCELLED_BY_STRIKING",
            Self::LeadershipResponded => "LEADERSHIP_RESPONDED",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = ValidationError;

    /// Accepts the canonical name (case-insensitive, `-` or `_`) or the
    /// numeric code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<i16>() {
            return Self::from_code(code);
        }
        let normalized = trimmed.replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| ValidationError::UnknownStatus(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_one_through_fourteen() {
        let codes: Vec<i16> = RequestStatus::ALL.iter().map(|s| s.code()).collect();
        assert_eq!(codes, (1..=14).collect::<Vec<i16>>());
    }

    #[test]
    fn code_roundtrip() {
        for status in RequestStatus::ALL {
            assert_eq!(RequestStatus::from_code(status.code()).unwrap(), status);
        }
        assert!(RequestStatus::from_code(0).is_err());
        assert!(RequestStatus::from_code(15).is_err());
    }

    #[test]
    fn terminal_set() {
        let terminal: Vec<RequestStatus> = RequestStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![
                RequestStatus::Rejected,
                RequestStatus::CancelledForNonCompletion,
                RequestStatus::Finalized,
                RequestStatus::CancelledByStriking,
                RequestStatus::LeadershipResponded,
            ]
        );
    }

    #[test]
    fn parse_accepts_names_and_codes() {
        assert_eq!("IN_AUDITING".parse::<RequestStatus>().unwrap(), RequestStatus::InAuditing);
        assert_eq!(
            "temporarily-reserved".parse::<RequestStatus>().unwrap(),
            RequestStatus::TemporarilyReserved
        );
        assert_eq!("12".parse::<RequestStatus>().unwrap(), RequestStatus::Finalized);
        assert!("LIMBO".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn serde_uses_screaming_case() {
        let json = serde_json::to_string(&RequestStatus::PendingIpResponse).unwrap();
        assert_eq!(json, "\"PENDING_IP_RESPONSE\"");
        for status in RequestStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }
}
