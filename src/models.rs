use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

fn to_utc(dt: NaiveDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)
}

#[derive(Serialize)]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub teacher_id: i64,
    pub active: bool,
    pub remedials_taken: i64,
    pub elements_completed: i64,
    pub elements_evaluated: i64,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbCourse {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub teacher_id: Option<i64>,
    pub active: Option<bool>,
    pub remedials_taken: Option<i64>,
    pub elements_completed: Option<i64>,
    pub elements_evaluated: Option<i64>,
}

impl From<DbCourse> for Course {
    fn from(course: DbCourse) -> Self {
        Self {
            id: course.id.unwrap_or_default(),
            name: course.name.unwrap_or_default(),
            teacher_id: course.teacher_id.unwrap_or_default(),
            active: course.active.unwrap_or_default(),
            remedials_taken: course.remedials_taken.unwrap_or_default(),
            elements_completed: course.elements_completed.unwrap_or_default(),
            elements_evaluated: course.elements_evaluated.unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
pub struct CompetencyElement {
    pub id: i64,
    pub course_id: i64,
    pub description: String,
    pub comment: String,
    pub registered_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed: bool,
    pub evaluated: bool,
    pub knowledge_total: i64,
    pub knowledge_completed: i64,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbCompetencyElement {
    pub id: Option<i64>,
    pub course_id: Option<i64>,
    pub description: Option<String>,
    pub comment: Option<String>,
    pub registered_at: Option<NaiveDateTime>,
    pub due_date: Option<NaiveDateTime>,
    pub completed: Option<bool>,
    pub evaluated: Option<bool>,
    pub knowledge_total: Option<i64>,
    pub knowledge_completed: Option<i64>,
}

impl From<DbCompetencyElement> for CompetencyElement {
    fn from(db: DbCompetencyElement) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            course_id: db.course_id.unwrap_or_default(),
            description: db.description.unwrap_or_default(),
            comment: db.comment.unwrap_or_default(),
            registered_at: db.registered_at.map(to_utc).unwrap_or_else(Utc::now),
            due_date: db.due_date.map(to_utc),
            completed: db.completed.unwrap_or_default(),
            evaluated: db.evaluated.unwrap_or_default(),
            knowledge_total: db.knowledge_total.unwrap_or_default(),
            knowledge_completed: db.knowledge_completed.unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
pub struct MinimumKnowledge {
    pub id: i64,
    pub element_id: i64,
    pub description: String,
    pub completed: bool,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbMinimumKnowledge {
    pub id: Option<i64>,
    pub element_id: Option<i64>,
    pub description: Option<String>,
    pub completed: Option<bool>,
}

impl From<DbMinimumKnowledge> for MinimumKnowledge {
    fn from(db: DbMinimumKnowledge) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            element_id: db.element_id.unwrap_or_default(),
            description: db.description.unwrap_or_default(),
            completed: db.completed.unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
pub struct Remedial {
    pub id: i64,
    pub element_id: i64,
    pub completed: bool,
    pub evaluated_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbRemedial {
    pub id: Option<i64>,
    pub element_id: Option<i64>,
    pub completed: Option<bool>,
    pub evaluated_at: Option<NaiveDateTime>,
}

impl From<DbRemedial> for Remedial {
    fn from(db: DbRemedial) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            element_id: db.element_id.unwrap_or_default(),
            completed: db.completed.unwrap_or_default(),
            evaluated_at: db.evaluated_at.map(to_utc),
        }
    }
}

#[derive(Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: Option<i64>,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl From<DbUser> for User {
    fn from(user: DbUser) -> Self {
        Self {
            id: user.id.unwrap_or_default(),
            email: user.email.unwrap_or_default(),
            name: user.name.unwrap_or_default(),
        }
    }
}

/// Which deadline condition a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Overdue,
    DueSoon,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Overdue => "overdue",
            NotificationKind::DueSoon => "due_soon",
        }
    }
}

/// A competency element that needs a notification this cycle, joined with
/// the owning course and instructor. Produced by the scanner, consumed once
/// by the dispatcher; never persisted.
#[derive(Clone)]
pub struct Candidate {
    pub element_id: i64,
    pub course_id: i64,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub course_name: String,
    pub teacher_id: i64,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbCandidate {
    pub element_id: Option<i64>,
    pub course_id: Option<i64>,
    pub description: Option<String>,
    pub due_date: Option<NaiveDateTime>,
    pub course_name: Option<String>,
    pub teacher_id: Option<i64>,
}

impl From<DbCandidate> for Candidate {
    fn from(db: DbCandidate) -> Self {
        Self {
            element_id: db.element_id.unwrap_or_default(),
            course_id: db.course_id.unwrap_or_default(),
            description: db.description.unwrap_or_default(),
            due_date: db.due_date.map(to_utc).unwrap_or_else(Utc::now),
            course_name: db.course_name.unwrap_or_default(),
            teacher_id: db.teacher_id.unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
pub struct NotificationRecord {
    pub id: i64,
    pub user_id: i64,
    pub element_id: i64,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbNotificationRecord {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub element_id: Option<i64>,
    pub kind: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub sent_at: Option<NaiveDateTime>,
}

impl From<DbNotificationRecord> for NotificationRecord {
    fn from(db: DbNotificationRecord) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            user_id: db.user_id.unwrap_or_default(),
            element_id: db.element_id.unwrap_or_default(),
            kind: db.kind.unwrap_or_default(),
            title: db.title.unwrap_or_default(),
            body: db.body.unwrap_or_default(),
            sent_at: db.sent_at.map(to_utc).unwrap_or_else(Utc::now),
        }
    }
}
