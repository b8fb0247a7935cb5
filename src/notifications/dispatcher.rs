use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::error::AppError;
use crate::models::{Candidate, NotificationKind};
use crate::notifications::history::record_notification;
use crate::notifications::sender::{DeliveryOutcome, PushPayload, PushSender};
use crate::notifications::tokens::{remove_token, tokens_for};

/// Upper bound on a single delivery attempt, so one unreachable device
/// cannot stall the whole cycle.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub delivered: usize,
    pub invalid_tokens: usize,
    pub transient_failures: usize,
    pub history_written: bool,
}

/// Delivers one candidate's notification to every device of the owning
/// instructor and appends exactly one history record — once per candidate,
/// never per token, whatever the delivery outcomes were. Zero registered
/// devices still produces the record: it documents "the user was notified
/// about this deadline today", which is what the scanner's dedup reads.
///
/// Attempts run concurrently across the user's tokens, each classified
/// independently; a token the transport reports as unregistered is removed
/// on the spot, siblings untouched. A failed history write is logged and the
/// candidate still counts as processed — the next cycle will see no record
/// and notify again (at-least-once, accepted).
#[instrument(
    skip(pool, sender, candidate),
    fields(element_id = candidate.element_id, user_id = candidate.teacher_id, kind = kind.as_str())
)]
pub async fn dispatch(
    pool: &Pool<Sqlite>,
    sender: &Arc<dyn PushSender>,
    candidate: &Candidate,
    kind: NotificationKind,
    now: DateTime<Utc>,
) -> Result<DispatchOutcome, AppError> {
    info!("Dispatching deadline notification");

    let tokens = tokens_for(pool, candidate.teacher_id).await?;
    let payload = build_payload(candidate, kind);

    let mut outcome = DispatchOutcome::default();

    if tokens.is_empty() {
        info!("No registered devices for user, recording history only");
    } else {
        let mut attempts: JoinSet<(String, DeliveryOutcome)> = JoinSet::new();
        for token in tokens {
            let sender = Arc::clone(sender);
            let payload = payload.clone();
            attempts.spawn(async move {
                let delivery = match timeout(DELIVERY_TIMEOUT, sender.send(&token, &payload)).await
                {
                    Ok(delivery) => delivery,
                    Err(_) => {
                        warn!("Delivery attempt timed out");
                        DeliveryOutcome::TransientFailure
                    }
                };
                (token, delivery)
            });
        }

        while let Some(joined) = attempts.join_next().await {
            let (token, delivery) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "Delivery task failed to complete");
                    outcome.transient_failures += 1;
                    continue;
                }
            };

            match delivery {
                DeliveryOutcome::Delivered => outcome.delivered += 1,
                DeliveryOutcome::InvalidToken => {
                    outcome.invalid_tokens += 1;
                    if let Err(e) = remove_token(pool, &token).await {
                        e.log_and_record("removing invalid device token");
                    }
                }
                DeliveryOutcome::TransientFailure => outcome.transient_failures += 1,
            }
        }
    }

    match record_notification(
        pool,
        candidate.teacher_id,
        candidate.element_id,
        kind,
        &payload.title,
        &payload.body,
        now.naive_utc(),
    )
    .await
    {
        Ok(_) => outcome.history_written = true,
        Err(e) => e.log_and_record("recording notification history"),
    }

    Ok(outcome)
}

pub fn build_payload(candidate: &Candidate, kind: NotificationKind) -> PushPayload {
    let due = candidate.due_date.format("%Y-%m-%d");
    let (title, body) = match kind {
        NotificationKind::Overdue => (
            "Overdue competency element".to_string(),
            format!(
                "\"{}\" in {} was due on {} and is still incomplete.",
                candidate.description, candidate.course_name, due
            ),
        ),
        NotificationKind::DueSoon => (
            "Upcoming evaluation deadline".to_string(),
            format!(
                "\"{}\" in {} is due on {}.",
                candidate.description, candidate.course_name, due
            ),
        ),
    };

    PushPayload {
        title,
        body,
        kind,
        element_id: candidate.element_id,
    }
}
