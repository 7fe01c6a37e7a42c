//! Shared fixtures: an engine over the in-memory store, a manual clock and
//! a recording dispatcher that can be switched into failure mode.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;

use cnr_core::{
    ActorContext, Clock, CompanyTypeId, ManualClock, ProvinceId, RequestId, Role, UserId, WorkflowConfig,
};
use cnr_state::{NewRequest, RecordParts, RequestRecord, RequestStatus};
use cnr_workflow::{
    InMemoryStore, Notification, NotificationDispatcher, NotificationKind, NotifyError, Recipient,
    WorkflowEngine,
};

/// Dispatcher that records every message, or fails on demand.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Recipient, Notification)>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(Recipient, Notification)> {
        self.sent.lock().clone()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.sent.lock().iter().filter(|(_, n)| n.kind == kind).count()
    }

    fn push(&self, recipient: Recipient, message: &Notification) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("transport offline".to_string()));
        }
        self.sent.lock().push((recipient, message.clone()));
        Ok(())
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn notify_user(&self, users: &[UserId], message: &Notification) -> Result<(), NotifyError> {
        self.push(Recipient::Users(users.to_vec()), message)
    }

    async fn notify_role(&self, role: Role, message: &Notification) -> Result<(), NotifyError> {
        self.push(Recipient::Role(role), message)
    }
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 1, 9, 0, 0).unwrap()
}

pub struct Harness {
    pub engine: Arc<WorkflowEngine>,
    pub store: Arc<InMemoryStore>,
    pub clock: ManualClock,
    pub notifier: Arc<RecordingNotifier>,
    pub applicant: UserId,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(WorkflowConfig::default())
    }

    pub fn with_config(config: WorkflowConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = ManualClock::new(start());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = Arc::new(WorkflowEngine::new(
            store.clone(),
            notifier.clone(),
            Arc::new(clock.clone()),
            config,
        ));
        Self {
            engine,
            store,
            clock,
            notifier,
            applicant: UserId::new(),
        }
    }

    pub fn submitter(&self) -> ActorContext {
        ActorContext::user(self.applicant, Role::Submitter).unwrap()
    }

    /// Register a fresh `New` request through the engine.
    pub async fn register(&self, name: &str) -> RequestRecord {
        self.engine
            .register(
                NewRequest {
                    company_name: name.to_string(),
                    company_type_id: CompanyTypeId(1),
                    province_id: ProvinceId(7),
                    submitted_by: self.applicant,
                },
                &self.submitter(),
            )
            .await
            .unwrap()
    }

    /// Place a record directly in the store at `status`.
    pub fn seed(&self, id: i64, status: RequestStatus, expiry: Option<DateTime<Utc>>) -> RequestRecord {
        self.seed_locked(id, status, expiry, None)
    }

    /// Like [`Harness::seed`], with the review lock already held by `holder`.
    pub fn seed_locked(
        &self,
        id: i64,
        status: RequestStatus,
        expiry: Option<DateTime<Utc>>,
        holder: Option<UserId>,
    ) -> RequestRecord {
        let now = self.clock.now();
        let record = RequestRecord::from_parts(RecordParts {
            id: RequestId(id),
            company_name: format!("Seeded Company {id}"),
            company_type_id: CompanyTypeId(1),
            province_id: ProvinceId(1),
            submitted_by: self.applicant,
            status,
            locked_by: holder,
            locked_at: holder.map(|_| now - Duration::days(1)),
            reservation_expiry_date: expiry,
            registry_number: None,
            registry_date: None,
            invoice_id: None,
            ip_expert_id: None,
            ip_expert_feedback: None,
            ip_verdict: None,
            auditor_feedback: None,
            leadership_feedback: None,
            version: 3,
            created_at: now - Duration::days(10),
            updated_at: now - Duration::days(8),
        })
        .unwrap();
        self.store.seed(record.clone());
        record
    }
}

/// A fresh human actor with `role`.
pub fn user(role: Role) -> ActorContext {
    ActorContext::user(UserId::new(), role).unwrap()
}
