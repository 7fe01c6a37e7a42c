//! # Notification Dispatch
//!
//! Delivery of workflow notifications to users and roles. Dispatch is
//! best-effort: a failed delivery is logged and counted, and never rolls
//! back or blocks the transition that triggered it. [`deliver`] is the only
//! place that swallows a dispatcher error.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cnr_core::{RequestId, Role, UserId, ValidationError};

use crate::store::RequestStore;

/// Error reported by a notification transport.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// No recipient could be resolved (e.g. nobody holds the role).
    #[error("no recipients for {0}")]
    NoRecipients(String),

    /// The transport refused or failed the delivery.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Reservation expires soon.
    ExpiryWarning,
    /// Reservation lapsed and the request was cancelled.
    AutoCancelled,
    /// The request moved to a status the applicant should hear about.
    StatusChanged,
    /// A reviewer or role has new work.
    AssignedForReview,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExpiryWarning => "expiry_warning",
            Self::AutoCancelled => "auto_cancelled",
            Self::StatusChanged => "status_changed",
            Self::AssignedForReview => "assigned_for_review",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::ExpiryWarning,
            Self::AutoCancelled,
            Self::StatusChanged,
            Self::AssignedForReview,
        ]
        .into_iter()
        .find(|k| k.as_str() == s)
        .ok_or_else(|| ValidationError::UnknownValue {
            kind: "notification kind",
            value: s.to_string(),
        })
    }
}

/// A message handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub request_id: Option<RequestId>,
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn about(request_id: RequestId, kind: NotificationKind, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind,
            request_id: Some(request_id),
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Who a notification is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Recipient {
    Users(Vec<UserId>),
    Role(Role),
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Users(users) => write!(f, "{} user(s)", users.len()),
            Self::Role(role) => write!(f, "role {role}"),
        }
    }
}

/// A successfully delivered notification, as kept by the store.
///
/// The sweeper consults these to avoid sending a second expiry warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentNotification {
    pub request_id: RequestId,
    pub kind: NotificationKind,
    pub recipient: Recipient,
    pub title: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// Notification transport.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver to specific users.
    async fn notify_user(&self, users: &[UserId], message: &Notification) -> Result<(), NotifyError>;

    /// Deliver to everyone holding `role`.
    async fn notify_role(&self, role: Role, message: &Notification) -> Result<(), NotifyError>;
}

/// Dispatcher that writes notifications to the tracing log.
///
/// Used by the CLI when no external transport is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn notify_user(&self, users: &[UserId], message: &Notification) -> Result<(), NotifyError> {
        if users.is_empty() {
            return Err(NotifyError::NoRecipients(message.kind.to_string()));
        }
        for user in users {
            tracing::info!(
                recipient = %user,
                kind = %message.kind,
                request_id = ?message.request_id,
                title = %message.title,
                "notification"
            );
        }
        Ok(())
    }

    async fn notify_role(&self, role: Role, message: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            recipient_role = %role,
            kind = %message.kind,
            request_id = ?message.request_id,
            title = %message.title,
            "notification"
        );
        Ok(())
    }
}

/// Deliver `message` and remember it in the store.
///
/// Returns whether delivery succeeded. Failures of either the transport or
/// the bookkeeping write are logged and counted, never returned.
pub async fn deliver(
    dispatcher: &dyn NotificationDispatcher,
    store: &dyn RequestStore,
    recipient: Recipient,
    message: Notification,
    now: DateTime<Utc>,
) -> bool {
    let sent = match &recipient {
        Recipient::Users(users) => dispatcher.notify_user(users, &message).await,
        Recipient::Role(role) => dispatcher.notify_role(*role, &message).await,
    };
    if let Err(e) = sent {
        metrics::counter!("cnr_notification_failures_total", "kind" => message.kind.as_str())
            .increment(1);
        tracing::warn!(
            error = %e,
            kind = %message.kind,
            request_id = ?message.request_id,
            recipient = %recipient,
            "notification dispatch failed; transition already committed"
        );
        return false;
    }

    if let Some(request_id) = message.request_id {
        let record = SentNotification {
            request_id,
            kind: message.kind,
            recipient,
            title: message.title,
            body: message.body,
            sent_at: now,
        };
        if let Err(e) = store.record_notification(&record).await {
            tracing::warn!(
                error = %e,
                request_id = %request_id,
                kind = %record.kind,
                "failed to record delivered notification"
            );
        }
    }
    true
}
