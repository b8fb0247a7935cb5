use chrono::NaiveDateTime;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{DbNotificationRecord, NotificationKind, NotificationRecord};

/// Appends one notification record. Records are immutable once written; the
/// scanner's exclusion query is what keeps this at most once per
/// (user, element, kind, calendar day).
#[instrument(skip(title, body))]
pub async fn record_notification(
    pool: &Pool<Sqlite>,
    user_id: i64,
    element_id: i64,
    kind: NotificationKind,
    title: &str,
    body: &str,
    sent_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Recording notification history");
    let res = sqlx::query(
        "INSERT INTO notification_history (user_id, element_id, kind, title, body, sent_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(element_id)
    .bind(kind.as_str())
    .bind(title)
    .bind(body)
    .bind(sent_at)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

/// What the instructor's notification feed shows, newest first.
#[instrument]
pub async fn notifications_for_user(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Vec<NotificationRecord>, AppError> {
    info!("Getting notification history for user");
    let rows = sqlx::query_as::<_, DbNotificationRecord>(
        "SELECT * FROM notification_history WHERE user_id = ? ORDER BY sent_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(NotificationRecord::from).collect())
}

/// Whether a same-kind notification for this user and element was already
/// recorded on the calendar day of `day` (UTC).
#[instrument]
pub async fn has_notification_on_day(
    pool: &Pool<Sqlite>,
    user_id: i64,
    element_id: i64,
    kind: NotificationKind,
    day: NaiveDateTime,
) -> Result<bool, AppError> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS(
             SELECT 1 FROM notification_history
             WHERE user_id = ? AND element_id = ? AND kind = ? AND date(sent_at) = date(?)
         )",
    )
    .bind(user_id)
    .bind(element_id)
    .bind(kind.as_str())
    .bind(day)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}
