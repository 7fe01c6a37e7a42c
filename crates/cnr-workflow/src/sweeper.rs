//! # Reservation Expiry Sweeper
//!
//! Periodic job enforcing the reservation deadline. Each tick runs three
//! passes, each capped at `sweep_batch_size` requests:
//!
//! - **reservation**: `Accepted` requests whose automatic reservation did
//!   not commit get the system `Reserve` transition;
//! - **warning**: reserved requests expiring within the warning window
//!   that have never been warned get one `expiry_warning`. The store
//!   excludes warned requests before applying the batch cap;
//! - **expiry**: reserved requests past their deadline are cancelled
//!   through `WorkflowEngine::execute(SweeperExpire)`.
//!
//! Every pass is a function of the clock and stored deadlines, so a
//! repeated or delayed tick converges on the same state. A conflict on one
//! request is logged and skipped; the next tick retries it.
//!
//! Only one sweeper should run per deployment. Two instances would both
//! pass the warning check before either records its warning.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use cnr_core::ActorContext;
use cnr_state::{ActionKind, RequestRecord, RequestStatus, WorkflowCommand};

use crate::engine::{WorkflowEngine, AUTO_CANCEL_NOTE};
use crate::error::{Result, WorkflowError};
use crate::notify::{deliver, Notification, NotificationKind, Recipient};

/// Counters for one sweeper tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Accepted requests reserved by the recovery pass.
    pub reserved: usize,
    /// Expiry warnings delivered.
    pub warned: usize,
    /// Reservations cancelled.
    pub expired: usize,
    /// Requests skipped because another writer got there first.
    pub conflicts: usize,
    /// Requests skipped because of any other error.
    pub failures: usize,
}

impl SweepReport {
    /// Whether the tick changed or sent anything.
    pub fn is_quiet(&self) -> bool {
        self.reserved == 0 && self.warned == 0 && self.expired == 0
    }
}

/// The reservation deadline enforcer.
pub struct ReservationExpirySweeper {
    engine: Arc<WorkflowEngine>,
}

impl ReservationExpirySweeper {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self { engine }
    }

    /// Run one tick of all three passes.
    ///
    /// Fails only when a candidate query fails; per-request errors are
    /// counted in the report.
    pub async fn tick(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        self.reservation_pass(&mut report).await?;
        self.warning_pass(&mut report).await?;
        self.expiry_pass(&mut report).await?;

        if report.is_quiet() {
            tracing::debug!(?report, "sweep tick found nothing to do");
        } else {
            tracing::info!(
                reserved = report.reserved,
                warned = report.warned,
                expired = report.expired,
                conflicts = report.conflicts,
                failures = report.failures,
                "sweep tick complete"
            );
        }
        Ok(report)
    }

    /// Tick every `sweep_interval` until `shutdown` is cancelled.
    ///
    /// The first tick runs immediately. A failed tick is logged and the
    /// loop carries on.
    pub async fn run(&self, shutdown: CancellationToken) {
        let period = self.engine.config().sweep_interval;
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(interval_secs = period.as_secs(), "reservation sweeper started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, code = e.code(), "sweep tick failed");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("reservation sweeper shutting down");
                    break;
                }
            }
        }
    }

    async fn reservation_pass(&self, report: &mut SweepReport) -> Result<()> {
        let batch = self.engine.config().sweep_batch_size;
        let accepted = self
            .engine
            .store()
            .find_by_status(RequestStatus::Accepted, batch)
            .await?;
        for record in accepted {
            match self.engine.reserve(record.id()).await {
                Ok(_) => report.reserved += 1,
                Err(e) => skip(report, &record, ActionKind::Reserve, e),
            }
        }
        Ok(())
    }

    async fn warning_pass(&self, report: &mut SweepReport) -> Result<()> {
        let config = self.engine.config();
        let now = self.engine.now();
        let store = self.engine.store();
        let until = now
            .checked_add_signed(config.warning_window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let expiring = store
            .find_unwarned_expiring(now, until, config.sweep_batch_size)
            .await?;

        for record in expiring {
            let id = record.id();
            let Some(expiry) = record.reservation_expiry_date() else {
                continue;
            };
            let message = Notification::about(
                id,
                NotificationKind::ExpiryWarning,
                format!("Reservation expiring: {}", record.company_name()),
                format!(
                    "The reservation for \"{}\" expires on {}. Finalize registration before then or it will be cancelled.",
                    record.company_name(),
                    expiry.format("%Y-%m-%d %H:%M UTC")
                ),
            );
            let delivered = deliver(
                self.engine.notifier().as_ref(),
                store.as_ref(),
                Recipient::Users(vec![record.submitted_by()]),
                message,
                now,
            )
            .await;
            if delivered {
                metrics::counter!("cnr_sweeper_warnings_total").increment(1);
                report.warned += 1;
            }
        }
        Ok(())
    }

    async fn expiry_pass(&self, report: &mut SweepReport) -> Result<()> {
        let config = self.engine.config();
        let now = self.engine.now();
        let expired = self
            .engine
            .store()
            .find_reserved_expired(now, config.sweep_batch_size)
            .await?;

        let system = ActorContext::system();
        for record in expired {
            let command = WorkflowCommand::new(ActionKind::SweeperExpire).with_note(AUTO_CANCEL_NOTE);
            match self.engine.execute(record.id(), command, &system).await {
                Ok(_) => {
                    metrics::counter!("cnr_sweeper_expired_total").increment(1);
                    report.expired += 1;
                }
                Err(e) => skip(report, &record, ActionKind::SweeperExpire, e),
            }
        }
        Ok(())
    }
}

fn skip(report: &mut SweepReport, record: &RequestRecord, action: ActionKind, err: WorkflowError) {
    match err {
        // Someone else moved the request first; next tick re-evaluates.
        WorkflowError::ConcurrencyConflict(_) | WorkflowError::InvalidTransition { .. } => {
            report.conflicts += 1;
            tracing::warn!(request_id = %record.id(), action = %action, error = %err, "sweeper skipped request");
        }
        other => {
            report.failures += 1;
            tracing::error!(request_id = %record.id(), action = %action, error = %other, "sweeper failed on request");
        }
    }
}
