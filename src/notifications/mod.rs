pub mod dispatcher;
pub mod history;
pub mod scanner;
pub mod scheduler;
pub mod sender;
pub mod tokens;

pub use scanner::DUE_SOON_WINDOW_DAYS;
pub use scheduler::NotificationScheduler;
pub use sender::{DEFAULT_EXPO_PUSH_URL, DeliveryOutcome, ExpoPushClient, PushPayload, PushSender};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::NotificationKind;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CycleSummary {
    pub overdue: usize,
    pub due_soon: usize,
    pub delivered: usize,
    pub invalid_tokens: usize,
    pub transient_failures: usize,
    pub history_failures: usize,
    pub dispatch_failures: usize,
}

/// Runs scan-and-dispatch cycles over the shared pool. The cycle lock
/// serializes firings from the overlapping schedules and the manual trigger:
/// two concurrent passes could both pick up a candidate before either wrote
/// its history record.
pub struct NotificationEngine {
    pool: Pool<Sqlite>,
    sender: Arc<dyn PushSender>,
    cycle_lock: Mutex<()>,
}

impl NotificationEngine {
    pub fn new(pool: Pool<Sqlite>, sender: Arc<dyn PushSender>) -> Self {
        Self {
            pool,
            sender,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Runs one cycle, waiting for any in-flight cycle to finish first. Used
    /// by the manual trigger endpoint.
    pub async fn run_cycle(&self) -> Result<CycleSummary, AppError> {
        let _guard = self.cycle_lock.lock().await;
        self.run_cycle_inner(Utc::now()).await
    }

    /// Runs one cycle unless another is already in flight, in which case the
    /// firing is skipped entirely — the next schedule will catch up. Used by
    /// the scheduler.
    pub async fn try_run_cycle(&self) -> Option<Result<CycleSummary, AppError>> {
        match self.cycle_lock.try_lock() {
            Ok(_guard) => Some(self.run_cycle_inner(Utc::now()).await),
            Err(_) => None,
        }
    }

    /// A scan error skips the whole cycle (fail-closed); a dispatch error is
    /// logged and processing moves on to the next candidate.
    #[instrument(skip(self), fields(cycle_id = %Uuid::new_v4()))]
    pub(crate) async fn run_cycle_inner(
        &self,
        now: DateTime<Utc>,
    ) -> Result<CycleSummary, AppError> {
        info!("Running notification cycle");

        let scan = scanner::scan(&self.pool, now).await?;

        let mut summary = CycleSummary {
            overdue: scan.overdue.len(),
            due_soon: scan.due_soon.len(),
            ..CycleSummary::default()
        };

        let candidates = scan
            .overdue
            .iter()
            .map(|c| (c, NotificationKind::Overdue))
            .chain(scan.due_soon.iter().map(|c| (c, NotificationKind::DueSoon)));

        for (candidate, kind) in candidates {
            match dispatcher::dispatch(&self.pool, &self.sender, candidate, kind, now).await {
                Ok(outcome) => {
                    summary.delivered += outcome.delivered;
                    summary.invalid_tokens += outcome.invalid_tokens;
                    summary.transient_failures += outcome.transient_failures;
                    if !outcome.history_written {
                        summary.history_failures += 1;
                    }
                }
                Err(e) => {
                    e.log_and_record("dispatching notification candidate");
                    summary.dispatch_failures += 1;
                }
            }
        }

        info!(
            overdue = summary.overdue,
            due_soon = summary.due_soon,
            delivered = summary.delivered,
            invalid_tokens = summary.invalid_tokens,
            transient_failures = summary.transient_failures,
            history_failures = summary.history_failures,
            dispatch_failures = summary.dispatch_failures,
            "Notification cycle complete"
        );

        Ok(summary)
    }
}
