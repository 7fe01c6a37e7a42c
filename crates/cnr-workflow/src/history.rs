//! # History Ledger
//!
//! Append-only record of everything that happened to a request. Entries
//! are sealed into a per-request SHA-256 hash chain when the store commits
//! them:
//!
//! ```text
//! entry_hash = SHA-256(previous_hash | request_id | sequence | user | role
//!                      | action_type | note | is_internal | created_at)
//! ```
//!
//! The first entry chains to [`GENESIS_HASH`]. There is no update or delete
//! API; appends only happen inside [`crate::store::RequestStore::commit`],
//! together with the record write they describe.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use cnr_core::{ActorContext, RequestId, Role, UserId};
use cnr_state::{ActionKind, ActionType};

use crate::error::{Result, WorkflowError};
use crate::store::RequestStore;

/// Hash the first entry of every chain links to.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// An entry waiting to be sealed by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDraft {
    pub user_id: Option<UserId>,
    pub role: Role,
    pub action_type: ActionType,
    pub note: Option<String>,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

impl ActionDraft {
    /// Draft an entry authored by `actor`.
    ///
    /// Lock bookkeeping and internal review steps are hidden from the
    /// submitter view.
    pub fn new(
        actor: &ActorContext,
        action_type: ActionType,
        note: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let is_internal = match action_type {
            ActionType::Submitted => false,
            ActionType::Transition(kind) => kind.is_internal(),
            ActionType::LockAcquired | ActionType::LockReleased | ActionType::LockForceReleased => {
                true
            }
        };
        Self {
            user_id: actor.user_id(),
            role: actor.role(),
            action_type,
            note,
            is_internal,
            created_at,
        }
    }

    /// Draft the entry for a status transition.
    pub fn transition(
        actor: &ActorContext,
        kind: ActionKind,
        note: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self::new(actor, ActionType::Transition(kind), note, created_at)
    }
}

/// A sealed, immutable history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAction {
    pub request_id: RequestId,
    /// 1-based position in the request's chain.
    pub sequence: i64,
    /// Absent for the system actor.
    pub user_id: Option<UserId>,
    pub role: Role,
    pub action_type: ActionType,
    pub note: Option<String>,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
    pub previous_hash: String,
    pub entry_hash: String,
}

impl RequestAction {
    /// Recompute this entry's hash from its fields.
    pub fn compute_hash(&self) -> String {
        entry_hash(
            &self.previous_hash,
            self.request_id,
            self.sequence,
            self.user_id,
            self.role,
            self.action_type,
            self.note.as_deref(),
            self.is_internal,
            self.created_at,
        )
    }
}

/// Seal `draft` as the entry following `previous` in `request_id`'s chain.
///
/// `created_at` is truncated to microseconds so the hash survives a
/// round-trip through a `TIMESTAMPTZ` column.
pub fn seal(request_id: RequestId, draft: ActionDraft, previous: Option<&RequestAction>) -> RequestAction {
    let sequence = previous.map_or(1, |p| p.sequence + 1);
    let previous_hash = previous.map_or_else(|| GENESIS_HASH.to_string(), |p| p.entry_hash.clone());
    let created_at = draft.created_at.trunc_subsecs(6);
    let entry_hash = entry_hash(
        &previous_hash,
        request_id,
        sequence,
        draft.user_id,
        draft.role,
        draft.action_type,
        draft.note.as_deref(),
        draft.is_internal,
        created_at,
    );
    RequestAction {
        request_id,
        sequence,
        user_id: draft.user_id,
        role: draft.role,
        action_type: draft.action_type,
        note: draft.note,
        is_internal: draft.is_internal,
        created_at,
        previous_hash,
        entry_hash,
    }
}

#[allow(clippy::too_many_arguments)]
fn entry_hash(
    previous_hash: &str,
    request_id: RequestId,
    sequence: i64,
    user_id: Option<UserId>,
    role: Role,
    action_type: ActionType,
    note: Option<&str>,
    is_internal: bool,
    created_at: DateTime<Utc>,
) -> String {
    let user = user_id.map_or_else(|| "system".to_string(), |u| u.0.to_string());
    let input = format!(
        "{previous_hash}|{}|{sequence}|{user}|{role}|{action_type}|{}|{is_internal}|{}",
        request_id.get(),
        note.unwrap_or(""),
        created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
    );
    sha256_hex(&input)
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

// ─── Views and Verification ──────────────────────────────────────────

/// Which entries a reader may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryView {
    /// Every entry (reviewers, officers).
    #[default]
    All,
    /// Only entries the applicant may see.
    SubmitterVisible,
}

impl HistoryView {
    fn admits(&self, entry: &RequestAction) -> bool {
        match self {
            Self::All => true,
            Self::SubmitterVisible => !entry.is_internal,
        }
    }
}

/// Outcome of re-walking a request's hash chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainVerification {
    pub request_id: RequestId,
    pub entries: usize,
    /// Sequence number of the first entry whose link or hash is wrong.
    pub first_broken: Option<i64>,
}

impl ChainVerification {
    pub fn is_intact(&self) -> bool {
        self.first_broken.is_none()
    }
}

/// Walk `entries` (in chain order) and report the first broken link.
pub fn verify_chain(request_id: RequestId, entries: &[RequestAction]) -> ChainVerification {
    let mut expected_prev = GENESIS_HASH;
    let mut first_broken = None;
    for (idx, entry) in entries.iter().enumerate() {
        let expected_seq = i64::try_from(idx).map_or(i64::MAX, |i| i + 1);
        if entry.request_id != request_id
            || entry.sequence != expected_seq
            || entry.previous_hash != expected_prev
            || entry.compute_hash() != entry.entry_hash
        {
            first_broken = Some(entry.sequence);
            break;
        }
        expected_prev = entry.entry_hash.as_str();
    }
    ChainVerification {
        request_id,
        entries: entries.len(),
        first_broken,
    }
}

/// Read side of the history ledger.
#[derive(Clone)]
pub struct HistoryLedger {
    store: Arc<dyn RequestStore>,
}

impl HistoryLedger {
    pub fn new(store: Arc<dyn RequestStore>) -> Self {
        Self { store }
    }

    /// Entries for `request_id` in order, filtered by `view`.
    pub async fn list(&self, request_id: RequestId, view: HistoryView) -> Result<Vec<RequestAction>> {
        self.ensure_exists(request_id).await?;
        let entries = self.store.history(request_id).await?;
        Ok(entries.into_iter().filter(|e| view.admits(e)).collect())
    }

    /// Recompute the hash chain for `request_id`.
    pub async fn verify(&self, request_id: RequestId) -> Result<ChainVerification> {
        self.ensure_exists(request_id).await?;
        let entries = self.store.history(request_id).await?;
        let report = verify_chain(request_id, &entries);
        if let Some(seq) = report.first_broken {
            tracing::error!(request_id = %request_id, sequence = seq, "history chain broken");
        }
        Ok(report)
    }

    async fn ensure_exists(&self, request_id: RequestId) -> Result<()> {
        match self.store.load(request_id).await? {
            Some(_) => Ok(()),
            None => Err(WorkflowError::NotFound(request_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 2, 10, 0, 0).unwrap()
    }

    fn chain(len: usize) -> Vec<RequestAction> {
        let auditor = ActorContext::user(UserId::new(), Role::Auditor).unwrap();
        let mut out: Vec<RequestAction> = Vec::new();
        for i in 0..len {
            let draft = ActionDraft::transition(
                &auditor,
                ActionKind::Take,
                Some(format!("step {i}")),
                t0() + Duration::minutes(i as i64),
            );
            let sealed = seal(RequestId(4), draft, out.last());
            out.push(sealed);
        }
        out
    }

    #[test]
    fn first_entry_links_to_genesis() {
        let entries = chain(1);
        assert_eq!(entries[0].sequence, 1);
        assert_eq!(entries[0].previous_hash, GENESIS_HASH);
        assert_eq!(entries[0].entry_hash.len(), 64);
    }

    #[test]
    fn intact_chain_verifies() {
        let entries = chain(5);
        let report = verify_chain(RequestId(4), &entries);
        assert!(report.is_intact());
        assert_eq!(report.entries, 5);
    }

    #[test]
    fn edited_note_breaks_chain_at_that_entry() {
        let mut entries = chain(4);
        entries[2].note = Some("rewritten".to_string());
        let report = verify_chain(RequestId(4), &entries);
        assert_eq!(report.first_broken, Some(3));
    }

    #[test]
    fn removed_entry_is_detected() {
        let mut entries = chain(4);
        entries.remove(1);
        assert!(!verify_chain(RequestId(4), &entries).is_intact());
    }

    #[test]
    fn sub_microsecond_precision_is_dropped_before_hashing() {
        let system = ActorContext::system();
        let at = t0() + Duration::nanoseconds(1_234_567);
        let sealed = seal(
            RequestId(1),
            ActionDraft::transition(&system, ActionKind::Reserve, None, at),
            None,
        );
        assert_eq!(sealed.created_at, t0() + Duration::microseconds(1_234));
        assert_eq!(sealed.compute_hash(), sealed.entry_hash);
    }

    #[test]
    fn lock_entries_are_internal() {
        let auditor = ActorContext::user(UserId::new(), Role::Auditor).unwrap();
        let draft = ActionDraft::new(&auditor, ActionType::LockAcquired, None, t0());
        assert!(draft.is_internal);
        assert!(!HistoryView::SubmitterVisible.admits(&seal(RequestId(1), draft, None)));
    }

    #[test]
    fn system_entries_have_no_user() {
        let draft = ActionDraft::transition(&ActorContext::system(), ActionKind::SweeperExpire, None, t0());
        assert_eq!(draft.user_id, None);
        assert_eq!(draft.role, Role::System);
        assert!(!draft.is_internal);
    }
}
