//! # Postgres Store
//!
//! [`RequestStore`] over the `name_requests`, `request_actions` and
//! `notifications` tables. Queries are runtime-checked (`sqlx::query` /
//! `query_as`) so the crate builds without a live database.
//!
//! A commit runs in one transaction:
//!
//! 1. `UPDATE name_requests … WHERE id = $1 AND version = $expected`. Zero
//!    rows affected means another writer won; the transaction is rolled
//!    back and `VersionConflict` returned.
//! 2. Read the chain head. The row lock taken by step 1 serializes every
//!    committer of the same request, so the head cannot move underneath.
//! 3. Insert the sealed history rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use cnr_core::{CompanyTypeId, InvoiceId, ProvinceId, RequestId, Role, UserId, ValidationError};
use cnr_state::{ActionType, IpVerdict, NewRequest, RecordParts, RequestRecord, RequestStatus};

use crate::error::StoreError;
use crate::history::{seal, ActionDraft, RequestAction};
use crate::notify::{NotificationKind, SentNotification};
use crate::store::{Commit, RequestStore};

const RECORD_COLUMNS: &str = "id, company_name, company_type_id, province_id, submitted_by, status_id, \
     locked_by, locked_at, reservation_expiry_date, registry_number, registry_date, invoice_id, \
     ip_expert_id, ip_expert_feedback, ip_verdict, auditor_feedback, leadership_feedback, \
     version, created_at, updated_at";

const ACTION_COLUMNS: &str = "request_id, sequence, user_id, role, action_type, note, is_internal, \
     created_at, previous_hash, entry_hash";

/// Connect to `database_url` and apply the embedded migrations.
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await?;
    tracing::info!("connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database migrations applied");

    Ok(pool)
}

/// Postgres-backed request store.
#[derive(Debug, Clone)]
pub struct PgRequestStore {
    pool: PgPool,
}

impl PgRequestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn write_record(
        tx: &mut Transaction<'_, Postgres>,
        record: &RequestRecord,
        expected_version: i64,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE name_requests SET
                company_name = $3, company_type_id = $4, province_id = $5, submitted_by = $6,
                status_id = $7, locked_by = $8, locked_at = $9, reservation_expiry_date = $10,
                registry_number = $11, registry_date = $12, invoice_id = $13,
                ip_expert_id = $14, ip_expert_feedback = $15, ip_verdict = $16,
                auditor_feedback = $17, leadership_feedback = $18,
                version = $19, updated_at = $20
             WHERE id = $1 AND version = $2",
        )
        .bind(record.id().get())
        .bind(expected_version)
        .bind(record.company_name())
        .bind(record.company_type_id().0)
        .bind(record.province_id().0)
        .bind(record.submitted_by().0)
        .bind(record.status().code())
        .bind(record.locked_by().map(|u| u.0))
        .bind(record.locked_at())
        .bind(record.reservation_expiry_date())
        .bind(record.registry_number())
        .bind(record.registry_date())
        .bind(record.invoice_id().map(|i| i.0))
        .bind(record.ip_expert_id().map(|u| u.0))
        .bind(record.ip_expert_feedback())
        .bind(record.ip_verdict().map(|v| v.as_str()))
        .bind(record.auditor_feedback())
        .bind(record.leadership_feedback())
        .bind(record.version())
        .bind(record.updated_at())
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn chain_head(
        tx: &mut Transaction<'_, Postgres>,
        id: RequestId,
    ) -> Result<Option<RequestAction>, StoreError> {
        let row = sqlx::query_as::<_, ActionRow>(&format!(
            "SELECT {ACTION_COLUMNS} FROM request_actions
             WHERE request_id = $1 ORDER BY sequence DESC LIMIT 1"
        ))
        .bind(id.get())
        .fetch_optional(&mut **tx)
        .await?;
        row.map(ActionRow::into_action).transpose()
    }

    async fn append(tx: &mut Transaction<'_, Postgres>, entry: &RequestAction) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO request_actions ({ACTION_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(entry.request_id.get())
        .bind(entry.sequence)
        .bind(entry.user_id.map(|u| u.0))
        .bind(entry.role.as_str())
        .bind(entry.action_type.label())
        .bind(entry.note.as_deref())
        .bind(entry.is_internal)
        .bind(entry.created_at)
        .bind(&entry.previous_hash)
        .bind(&entry.entry_hash)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn fetch_records(&self, sql: &str, binds: RecordQuery) -> Result<Vec<RequestRecord>, StoreError> {
        let query = sqlx::query_as::<_, RequestRow>(sql);
        let query = match binds {
            RecordQuery::Status(status, limit) => query.bind(status.code()).bind(limit),
            RecordQuery::Window(after, until, limit) => query.bind(after).bind(until).bind(limit),
            RecordQuery::Before(now, limit) => query.bind(now).bind(limit),
        };
        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(RequestRow::into_record).collect()
    }
}

enum RecordQuery {
    Status(RequestStatus, i64),
    Window(DateTime<Utc>, DateTime<Utc>, i64),
    Before(DateTime<Utc>, i64),
}

fn limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[async_trait]
impl RequestStore for PgRequestStore {
    async fn insert(&self, request: NewRequest, submitted: ActionDraft) -> Result<(RequestRecord, RequestAction), StoreError> {
        let mut tx = self.pool.begin().await?;
        let raw_id: i64 = sqlx::query_scalar("SELECT nextval(pg_get_serial_sequence('name_requests', 'id'))")
            .fetch_one(&mut *tx)
            .await?;
        let id = RequestId(raw_id);
        let record = RequestRecord::register(id, request, submitted.created_at)
            .map_err(|source| StoreError::Corrupt { id, source })?;

        sqlx::query(&format!(
            "INSERT INTO name_requests ({RECORD_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, NULL, NULL, NULL, NULL, NULL, NULL,
                     NULL, NULL, NULL, NULL, NULL, $7, $8, $9)"
        ))
        .bind(id.get())
        .bind(record.company_name())
        .bind(record.company_type_id().0)
        .bind(record.province_id().0)
        .bind(record.submitted_by().0)
        .bind(record.status().code())
        .bind(record.version())
        .bind(record.created_at())
        .bind(record.updated_at())
        .execute(&mut *tx)
        .await?;

        let entry = seal(id, submitted, None);
        Self::append(&mut tx, &entry).await?;
        tx.commit().await?;
        Ok((record, entry))
    }

    async fn load(&self, id: RequestId) -> Result<Option<RequestRecord>, StoreError> {
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM name_requests WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;
        row.map(RequestRow::into_record).transpose()
    }

    async fn commit(&self, commit: Commit) -> Result<Vec<RequestAction>, StoreError> {
        let id = commit.record.id();
        let mut tx = self.pool.begin().await?;

        if !Self::write_record(&mut tx, &commit.record, commit.expected_version).await? {
            tx.rollback().await?;
            tracing::debug!(request_id = %id, expected = commit.expected_version, "version check failed");
            return Err(StoreError::VersionConflict {
                id,
                expected: commit.expected_version,
            });
        }

        let mut head = Self::chain_head(&mut tx, id).await?;
        let mut appended = Vec::with_capacity(commit.entries.len());
        for draft in commit.entries {
            let entry = seal(id, draft, head.as_ref());
            Self::append(&mut tx, &entry).await?;
            head = Some(entry.clone());
            appended.push(entry);
        }

        tx.commit().await?;
        Ok(appended)
    }

    async fn history(&self, id: RequestId) -> Result<Vec<RequestAction>, StoreError> {
        let rows = sqlx::query_as::<_, ActionRow>(&format!(
            "SELECT {ACTION_COLUMNS} FROM request_actions
             WHERE request_id = $1 ORDER BY sequence ASC"
        ))
        .bind(id.get())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ActionRow::into_action).collect()
    }

    async fn find_by_status(&self, status: RequestStatus, n: usize) -> Result<Vec<RequestRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM name_requests
             WHERE status_id = $1 ORDER BY updated_at ASC, id ASC LIMIT $2"
        );
        self.fetch_records(&sql, RecordQuery::Status(status, limit(n))).await
    }

    async fn find_unwarned_expiring(
        &self,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
        n: usize,
    ) -> Result<Vec<RequestRecord>, StoreError> {
        let warning = NotificationKind::ExpiryWarning.as_str();
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM name_requests
             WHERE status_id = 10 AND reservation_expiry_date > $1 AND reservation_expiry_date <= $2
               AND NOT EXISTS (
                   SELECT 1 FROM notifications
                   WHERE notifications.request_id = name_requests.id AND notifications.kind = '{warning}'
               )
             ORDER BY reservation_expiry_date ASC, id ASC LIMIT $3"
        );
        self.fetch_records(&sql, RecordQuery::Window(after, until, limit(n))).await
    }

    async fn find_reserved_expired(&self, now: DateTime<Utc>, n: usize) -> Result<Vec<RequestRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM name_requests
             WHERE status_id = 10 AND reservation_expiry_date <= $1
             ORDER BY reservation_expiry_date ASC, id ASC LIMIT $2"
        );
        self.fetch_records(&sql, RecordQuery::Before(now, limit(n))).await
    }

    async fn record_notification(&self, n: &SentNotification) -> Result<(), StoreError> {
        let recipient = serde_json::to_value(&n.recipient).map_err(|e| {
            tracing::error!(error = %e, "failed to serialize notification recipient");
            StoreError::Database(sqlx::Error::Encode(Box::new(e)))
        })?;
        sqlx::query(
            "INSERT INTO notifications (request_id, kind, recipient, title, body, sent_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(n.request_id.get())
        .bind(n.kind.as_str())
        .bind(recipient)
        .bind(&n.title)
        .bind(&n.body)
        .bind(n.sent_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ─── Row Mapping ─────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: i64,
    company_name: String,
    company_type_id: i32,
    province_id: i32,
    submitted_by: Uuid,
    status_id: i16,
    locked_by: Option<Uuid>,
    locked_at: Option<DateTime<Utc>>,
    reservation_expiry_date: Option<DateTime<Utc>>,
    registry_number: Option<String>,
    registry_date: Option<DateTime<Utc>>,
    invoice_id: Option<i64>,
    ip_expert_id: Option<Uuid>,
    ip_expert_feedback: Option<String>,
    ip_verdict: Option<String>,
    auditor_feedback: Option<String>,
    leadership_feedback: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RequestRow {
    fn into_record(self) -> Result<RequestRecord, StoreError> {
        let id = RequestId(self.id);
        let corrupt = |source: ValidationError| StoreError::Corrupt { id, source };
        let status = RequestStatus::from_code(self.status_id).map_err(corrupt)?;
        let ip_verdict = self
            .ip_verdict
            .as_deref()
            .map(str::parse::<IpVerdict>)
            .transpose()
            .map_err(corrupt)?;
        RequestRecord::from_parts(RecordParts {
            id,
            company_name: self.company_name,
            company_type_id: CompanyTypeId(self.company_type_id),
            province_id: ProvinceId(self.province_id),
            submitted_by: UserId(self.submitted_by),
            status,
            locked_by: self.locked_by.map(UserId),
            locked_at: self.locked_at,
            reservation_expiry_date: self.reservation_expiry_date,
            registry_number: self.registry_number,
            registry_date: self.registry_date,
            invoice_id: self.invoice_id.map(InvoiceId),
            ip_expert_id: self.ip_expert_id.map(UserId),
            ip_expert_feedback: self.ip_expert_feedback,
            ip_verdict,
            auditor_feedback: self.auditor_feedback,
            leadership_feedback: self.leadership_feedback,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
        .map_err(corrupt)
    }
}

#[derive(sqlx::FromRow)]
struct ActionRow {
    request_id: i64,
    sequence: i64,
    user_id: Option<Uuid>,
    role: String,
    action_type: String,
    note: Option<String>,
    is_internal: bool,
    created_at: DateTime<Utc>,
    previous_hash: String,
    entry_hash: String,
}

impl ActionRow {
    fn into_action(self) -> Result<RequestAction, StoreError> {
        let request_id = RequestId(self.request_id);
        let corrupt = |source: ValidationError| StoreError::Corrupt {
            id: request_id,
            source,
        };
        Ok(RequestAction {
            request_id,
            sequence: self.sequence,
            user_id: self.user_id.map(UserId),
            role: self.role.parse::<Role>().map_err(corrupt)?,
            action_type: ActionType::parse(&self.action_type).map_err(corrupt)?,
            note: self.note,
            is_internal: self.is_internal,
            created_at: self.created_at,
            previous_hash: self.previous_hash,
            entry_hash: self.entry_hash,
        })
    }
}
