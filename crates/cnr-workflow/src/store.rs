//! # Request Store
//!
//! The persistence collaborator. [`RequestStore::commit`] is the single
//! write path after intake: it compare-and-swaps the record on `version`
//! and appends the commit's history entries in the same atomic step, so a
//! record write can never land without its ledger entry or race another
//! writer of the same request.
//!
//! [`InMemoryStore`] keeps everything behind one `parking_lot::RwLock`
//! (never held across an `.await`). The Postgres adapter lives in
//! [`crate::postgres`].

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use cnr_core::RequestId;
use cnr_state::{NewRequest, RequestRecord, RequestStatus};

use crate::error::StoreError;
use crate::history::{seal, ActionDraft, RequestAction};
use crate::notify::{NotificationKind, SentNotification};

/// A version-checked record write plus the history entries describing it.
#[derive(Debug, Clone)]
pub struct Commit {
    /// The record after mutation.
    pub record: RequestRecord,
    /// The version the record had when it was loaded.
    pub expected_version: i64,
    /// Entries to append, in order.
    pub entries: Vec<ActionDraft>,
}

/// Persistence operations the workflow needs.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Allocate an id, persist a `New` record and its `Submitted` entry.
    async fn insert(&self, request: NewRequest, submitted: ActionDraft) -> Result<(RequestRecord, RequestAction), StoreError>;

    /// Load a record.
    async fn load(&self, id: RequestId) -> Result<Option<RequestRecord>, StoreError>;

    /// Apply a [`Commit`]. Fails with `VersionConflict` if the stored
    /// version is not `expected_version`; nothing is written in that case.
    async fn commit(&self, commit: Commit) -> Result<Vec<RequestAction>, StoreError>;

    /// All history entries for a request, in chain order.
    async fn history(&self, id: RequestId) -> Result<Vec<RequestAction>, StoreError>;

    /// Up to `limit` records in `status`, least recently updated first.
    async fn find_by_status(&self, status: RequestStatus, limit: usize) -> Result<Vec<RequestRecord>, StoreError>;

    /// Reserved records whose expiry lies in `(after, until]` and that have
    /// no delivered `expiry_warning`, soonest first.
    ///
    /// The warning filter is applied before `limit`, so already-warned
    /// requests never crowd unwarned ones out of a batch.
    async fn find_unwarned_expiring(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RequestRecord>, StoreError>;

    /// Reserved records whose expiry is at or before `now`, oldest first.
    async fn find_reserved_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<RequestRecord>, StoreError>;

    /// Remember a delivered notification.
    async fn record_notification(&self, notification: &SentNotification) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    last_id: i64,
    records: BTreeMap<RequestId, RequestRecord>,
    history: HashMap<RequestId, Vec<RequestAction>>,
    notifications: Vec<SentNotification>,
}

impl Tables {
    fn notified(&self, id: RequestId, kind: NotificationKind) -> bool {
        self.notifications.iter().any(|n| n.request_id == id && n.kind == kind)
    }
}

/// Process-local store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place an arbitrary record directly, bypassing the workflow.
    ///
    /// For fixtures that need a request already deep in its lifecycle.
    pub fn seed(&self, record: RequestRecord) {
        let mut tables = self.tables.write();
        tables.last_id = tables.last_id.max(record.id().get());
        tables.history.entry(record.id()).or_default();
        tables.records.insert(record.id(), record);
    }

    /// Every delivered notification, in delivery order.
    pub fn notifications(&self) -> Vec<SentNotification> {
        self.tables.read().notifications.clone()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.tables.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().records.is_empty()
    }

    fn select(
        &self,
        limit: usize,
        keep: impl Fn(&Tables, &RequestRecord) -> bool,
        key: impl Fn(&RequestRecord) -> (DateTime<Utc>, RequestId),
    ) -> Vec<RequestRecord> {
        let tables = self.tables.read();
        let mut found: Vec<RequestRecord> = tables
            .records
            .values()
            .filter(|r| keep(&tables, r))
            .cloned()
            .collect();
        found.sort_by_key(|r| key(r));
        found.truncate(limit);
        found
    }
}

fn expiry_key(record: &RequestRecord) -> (DateTime<Utc>, RequestId) {
    (
        record.reservation_expiry_date().unwrap_or(DateTime::<Utc>::MIN_UTC),
        record.id(),
    )
}

#[async_trait]
impl RequestStore for InMemoryStore {
    async fn insert(&self, request: NewRequest, submitted: ActionDraft) -> Result<(RequestRecord, RequestAction), StoreError> {
        let mut tables = self.tables.write();
        let id = RequestId(tables.last_id + 1);
        let record = RequestRecord::register(id, request, submitted.created_at)
            .map_err(|source| StoreError::Corrupt { id, source })?;
        let entry = seal(id, submitted, None);
        tables.last_id = id.get();
        tables.records.insert(id, record.clone());
        tables.history.insert(id, vec![entry.clone()]);
        Ok((record, entry))
    }

    async fn load(&self, id: RequestId) -> Result<Option<RequestRecord>, StoreError> {
        Ok(self.tables.read().records.get(&id).cloned())
    }

    async fn commit(&self, commit: Commit) -> Result<Vec<RequestAction>, StoreError> {
        let id = commit.record.id();
        let mut tables = self.tables.write();
        let current = tables.records.get(&id).ok_or(StoreError::NotFound(id))?;
        if current.version() != commit.expected_version {
            return Err(StoreError::VersionConflict {
                id,
                expected: commit.expected_version,
            });
        }

        let chain = tables.history.entry(id).or_default();
        let mut appended = Vec::with_capacity(commit.entries.len());
        for draft in commit.entries {
            let entry = seal(id, draft, chain.last());
            chain.push(entry.clone());
            appended.push(entry);
        }
        tables.records.insert(id, commit.record);
        Ok(appended)
    }

    async fn history(&self, id: RequestId) -> Result<Vec<RequestAction>, StoreError> {
        Ok(self.tables.read().history.get(&id).cloned().unwrap_or_default())
    }

    async fn find_by_status(&self, status: RequestStatus, limit: usize) -> Result<Vec<RequestRecord>, StoreError> {
        Ok(self.select(limit, |_, r| r.status() == status, |r| (r.updated_at(), r.id())))
    }

    async fn find_unwarned_expiring(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RequestRecord>, StoreError> {
        Ok(self.select(
            limit,
            |tables, r| {
                r.status() == RequestStatus::TemporarilyReserved
                    && r.reservation_expiry_date().is_some_and(|e| e > after && e <= until)
                    && !tables.notified(r.id(), NotificationKind::ExpiryWarning)
            },
            expiry_key,
        ))
    }

    async fn find_reserved_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<RequestRecord>, StoreError> {
        Ok(self.select(
            limit,
            |_, r| {
                r.status() == RequestStatus::TemporarilyReserved
                    && r.reservation_expiry_date().is_some_and(|e| e <= now)
            },
            expiry_key,
        ))
    }

    async fn record_notification(&self, notification: &SentNotification) -> Result<(), StoreError> {
        self.tables.write().notifications.push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cnr_core::{ActorContext, CompanyTypeId, ProvinceId, Role, UserId};
    use cnr_state::{ActionKind, ActionType, WorkflowCommand};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    fn intake() -> (NewRequest, ActionDraft) {
        let submitter = UserId::new();
        let actor = ActorContext::user(submitter, Role::Submitter).unwrap();
        (
            NewRequest {
                company_name: "Harbor Light Logistics".to_string(),
                company_type_id: CompanyTypeId(1),
                province_id: ProvinceId(3),
                submitted_by: submitter,
            },
            ActionDraft::new(&actor, ActionType::Submitted, None, t0()),
        )
    }

    #[tokio::test]
    async fn insert_assigns_sequential_ids() {
        let store = InMemoryStore::new();
        let (a, da) = intake();
        let (b, db) = intake();
        let (first, entry) = store.insert(a, da).await.unwrap();
        let (second, _) = store.insert(b, db).await.unwrap();
        assert_eq!(first.id(), RequestId(1));
        assert_eq!(second.id(), RequestId(2));
        assert_eq!(entry.sequence, 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn stale_commit_is_rejected_and_writes_nothing() {
        let store = InMemoryStore::new();
        let (req, draft) = intake();
        let (record, _) = store.insert(req, draft).await.unwrap();
        let auditor = ActorContext::user(UserId::new(), Role::Auditor).unwrap();

        let mut first = record.clone();
        first
            .apply(&WorkflowCommand::new(ActionKind::Take), &auditor, t0(), chrono::Duration::days(7))
            .unwrap();
        let take = ActionDraft::transition(&auditor, ActionKind::Take, None, t0());
        store
            .commit(Commit {
                record: first.clone(),
                expected_version: record.version(),
                entries: vec![take.clone()],
            })
            .await
            .unwrap();

        let err = store
            .commit(Commit {
                record: first,
                expected_version: record.version(),
                entries: vec![take],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));
        assert_eq!(store.history(record.id()).await.unwrap().len(), 2);
    }

    fn reserved(id: i64, expiry: DateTime<Utc>) -> RequestRecord {
        let (request, _) = intake();
        let mut parts = RequestRecord::register(RequestId(id), request, t0()).unwrap().to_parts();
        parts.status = RequestStatus::TemporarilyReserved;
        parts.reservation_expiry_date = Some(expiry);
        RequestRecord::from_parts(parts).unwrap()
    }

    fn warning(id: i64) -> SentNotification {
        SentNotification {
            request_id: RequestId(id),
            kind: NotificationKind::ExpiryWarning,
            recipient: crate::notify::Recipient::Users(vec![UserId::new()]),
            title: "Reservation expiring".to_string(),
            body: String::new(),
            sent_at: t0(),
        }
    }

    #[tokio::test]
    async fn warned_requests_do_not_fill_the_expiring_batch() {
        let store = InMemoryStore::new();
        store.seed(reserved(1, t0() + chrono::Duration::hours(10)));
        store.seed(reserved(2, t0() + chrono::Duration::hours(20)));
        store.seed(reserved(3, t0() + chrono::Duration::days(5)));
        store.record_notification(&warning(1)).await.unwrap();

        let until = t0() + chrono::Duration::days(2);
        let batch = store.find_unwarned_expiring(t0(), until, 1).await.unwrap();
        assert_eq!(batch.iter().map(RequestRecord::id).collect::<Vec<_>>(), vec![RequestId(2)]);

        store.record_notification(&warning(2)).await.unwrap();
        assert!(store.find_unwarned_expiring(t0(), until, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn only_expiry_warnings_suppress_a_candidate() {
        let store = InMemoryStore::new();
        store.seed(reserved(6, t0() + chrono::Duration::hours(6)));
        store
            .record_notification(&SentNotification {
                kind: NotificationKind::StatusChanged,
                ..warning(6)
            })
            .await
            .unwrap();
        store.record_notification(&warning(7)).await.unwrap();

        let batch = store
            .find_unwarned_expiring(t0(), t0() + chrono::Duration::days(2), 10)
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(store.notifications().len(), 2);
    }
}
