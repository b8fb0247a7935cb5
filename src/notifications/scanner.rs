use chrono::{DateTime, Duration, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{Candidate, DbCandidate, NotificationKind};

/// How far ahead of the due date the "due soon" reminder fires, in calendar
/// days.
pub const DUE_SOON_WINDOW_DAYS: i64 = 7;

pub struct ScanResult {
    pub overdue: Vec<Candidate>,
    pub due_soon: Vec<Candidate>,
}

const OVERDUE_QUERY: &str = "SELECT e.id AS element_id, e.course_id, e.description, e.due_date,
            c.name AS course_name, c.teacher_id
     FROM competency_elements e
     JOIN courses c ON e.course_id = c.id
     WHERE e.completed = 0
       AND e.due_date IS NOT NULL
       AND e.due_date < ?
       AND NOT EXISTS (
           SELECT 1 FROM notification_history h
           WHERE h.user_id = c.teacher_id
             AND h.element_id = e.id
             AND h.kind = ?
             AND date(h.sent_at) = date(?)
       )
     ORDER BY e.due_date";

const DUE_SOON_QUERY: &str = "SELECT e.id AS element_id, e.course_id, e.description, e.due_date,
            c.name AS course_name, c.teacher_id
     FROM competency_elements e
     JOIN courses c ON e.course_id = c.id
     WHERE e.completed = 0
       AND e.due_date IS NOT NULL
       AND e.due_date >= ?
       AND e.due_date <= ?
       AND NOT EXISTS (
           SELECT 1 FROM notification_history h
           WHERE h.user_id = c.teacher_id
             AND h.element_id = e.id
             AND h.kind = ?
             AND date(h.sent_at) = date(?)
       )
     ORDER BY e.due_date";

/// Finds the competency elements that need a notification at `now`: past-due
/// incomplete elements, and incomplete elements due inside the reminder
/// window. Elements already notified for the same kind on the same UTC
/// calendar day are excluded, which is the whole deduplication story — there
/// is no uniqueness constraint behind it. The two lists are disjoint because
/// a due date cannot be both before and after `now`.
///
/// Pure read. Any query error aborts the scan with no partial result; a
/// skipped cycle is preferable to notifying from stale data.
#[instrument(skip(pool))]
pub async fn scan(pool: &Pool<Sqlite>, now: DateTime<Utc>) -> Result<ScanResult, AppError> {
    info!("Scanning for deadline notification candidates");

    let now_naive = now.naive_utc();
    let horizon = now_naive + Duration::days(DUE_SOON_WINDOW_DAYS);

    let overdue = sqlx::query_as::<_, DbCandidate>(OVERDUE_QUERY)
        .bind(now_naive)
        .bind(NotificationKind::Overdue.as_str())
        .bind(now_naive)
        .fetch_all(pool)
        .await?;

    let due_soon = sqlx::query_as::<_, DbCandidate>(DUE_SOON_QUERY)
        .bind(now_naive)
        .bind(horizon)
        .bind(NotificationKind::DueSoon.as_str())
        .bind(now_naive)
        .fetch_all(pool)
        .await?;

    info!(
        overdue = overdue.len(),
        due_soon = due_soon.len(),
        "Deadline scan complete"
    );

    Ok(ScanResult {
        overdue: overdue.into_iter().map(Candidate::from).collect(),
        due_soon: due_soon.into_iter().map(Candidate::from).collect(),
    })
}
