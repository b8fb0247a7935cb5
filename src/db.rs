use chrono::NaiveDateTime;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{
    Course, CompetencyElement, DbCompetencyElement, DbCourse, DbMinimumKnowledge, DbRemedial,
    DbUser, MinimumKnowledge, Remedial, User,
};

#[instrument]
pub async fn get_all_users(pool: &Pool<Sqlite>) -> Result<Vec<User>, AppError> {
    info!("Getting all users");
    let rows = sqlx::query_as::<_, DbUser>("SELECT id, email, name FROM users ORDER BY name")
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(User::from).collect())
}

#[instrument]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>("SELECT id, email, name FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(user) => Ok(User::from(user)),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        ))),
    }
}

#[instrument]
pub async fn email_exists(pool: &Pool<Sqlite>, email: &str) -> Result<bool, AppError> {
    info!("Checking whether email is registered");
    let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE email = ?)")
        .bind(email)
        .fetch_one(pool)
        .await?;

    Ok(row.0)
}

#[instrument]
pub async fn get_courses_by_teacher_email(
    pool: &Pool<Sqlite>,
    email: &str,
) -> Result<Vec<Course>, AppError> {
    info!("Getting courses for teacher");
    let rows = sqlx::query_as::<_, DbCourse>(
        "SELECT c.* FROM courses c
         JOIN users u ON c.teacher_id = u.id
         WHERE u.email = ?",
    )
    .bind(email)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Course::from).collect())
}

/// Optional fields of a course progress update; `None` leaves the column
/// untouched.
#[derive(Debug, Default)]
pub struct CourseChanges {
    pub remedials_taken: Option<i64>,
    pub elements_completed: Option<i64>,
    pub elements_evaluated: Option<i64>,
    pub active: Option<bool>,
}

impl CourseChanges {
    pub fn is_empty(&self) -> bool {
        self.remedials_taken.is_none()
            && self.elements_completed.is_none()
            && self.elements_evaluated.is_none()
            && self.active.is_none()
    }
}

#[instrument]
pub async fn update_course(
    pool: &Pool<Sqlite>,
    course_id: i64,
    changes: CourseChanges,
) -> Result<(), AppError> {
    info!("Updating course");
    let result = sqlx::query(
        "UPDATE courses
         SET remedials_taken = COALESCE(?, remedials_taken),
             elements_completed = COALESCE(?, elements_completed),
             elements_evaluated = COALESCE(?, elements_evaluated),
             active = COALESCE(?, active)
         WHERE id = ?",
    )
    .bind(changes.remedials_taken)
    .bind(changes.elements_completed)
    .bind(changes.elements_evaluated)
    .bind(changes.active)
    .bind(course_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Course with id {} not found in database",
            course_id
        )));
    }

    Ok(())
}

#[instrument]
pub async fn get_elements_by_course(
    pool: &Pool<Sqlite>,
    course_id: i64,
) -> Result<Vec<CompetencyElement>, AppError> {
    info!("Getting competency elements for course");
    let rows = sqlx::query_as::<_, DbCompetencyElement>(
        "SELECT e.* FROM competency_elements e
         JOIN courses c ON e.course_id = c.id
         WHERE c.id = ?
         ORDER BY e.description",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(CompetencyElement::from).collect())
}

#[derive(Debug, Default)]
pub struct ElementChanges {
    pub evaluated: Option<bool>,
    pub comment: Option<String>,
    pub registered_at: Option<NaiveDateTime>,
    pub due_date: Option<NaiveDateTime>,
    pub knowledge_completed: Option<i64>,
    pub completed: Option<bool>,
}

impl ElementChanges {
    pub fn is_empty(&self) -> bool {
        self.evaluated.is_none()
            && self.comment.is_none()
            && self.registered_at.is_none()
            && self.due_date.is_none()
            && self.knowledge_completed.is_none()
            && self.completed.is_none()
    }
}

#[instrument]
pub async fn update_element(
    pool: &Pool<Sqlite>,
    element_id: i64,
    changes: ElementChanges,
) -> Result<(), AppError> {
    info!("Updating competency element");
    let result = sqlx::query(
        "UPDATE competency_elements
         SET evaluated = COALESCE(?, evaluated),
             comment = COALESCE(?, comment),
             registered_at = COALESCE(?, registered_at),
             due_date = COALESCE(?, due_date),
             knowledge_completed = COALESCE(?, knowledge_completed),
             completed = COALESCE(?, completed)
         WHERE id = ?",
    )
    .bind(changes.evaluated)
    .bind(changes.comment)
    .bind(changes.registered_at)
    .bind(changes.due_date)
    .bind(changes.knowledge_completed)
    .bind(changes.completed)
    .bind(element_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Competency element with id {} not found in database",
            element_id
        )));
    }

    Ok(())
}

#[instrument]
pub async fn get_knowledge_by_element(
    pool: &Pool<Sqlite>,
    element_id: i64,
) -> Result<Vec<MinimumKnowledge>, AppError> {
    info!("Getting minimum knowledge for element");
    let rows = sqlx::query_as::<_, DbMinimumKnowledge>(
        "SELECT k.* FROM minimum_knowledge k
         JOIN competency_elements e ON k.element_id = e.id
         WHERE e.id = ?",
    )
    .bind(element_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(MinimumKnowledge::from).collect())
}

#[instrument]
pub async fn set_knowledge_completed(
    pool: &Pool<Sqlite>,
    knowledge_id: i64,
    completed: bool,
) -> Result<(), AppError> {
    info!("Updating minimum knowledge completion");
    let result = sqlx::query("UPDATE minimum_knowledge SET completed = ? WHERE id = ?")
        .bind(completed)
        .bind(knowledge_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Minimum knowledge with id {} not found in database",
            knowledge_id
        )));
    }

    Ok(())
}

#[instrument]
pub async fn get_remedials_by_element(
    pool: &Pool<Sqlite>,
    element_id: i64,
) -> Result<Vec<Remedial>, AppError> {
    info!("Getting remedials for element");
    let rows = sqlx::query_as::<_, DbRemedial>(
        "SELECT r.* FROM remedials r
         JOIN competency_elements e ON r.element_id = e.id
         WHERE e.id = ?",
    )
    .bind(element_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Remedial::from).collect())
}

#[instrument]
pub async fn create_remedial(
    pool: &Pool<Sqlite>,
    element_id: i64,
    completed: bool,
    evaluated_at: Option<NaiveDateTime>,
) -> Result<i64, AppError> {
    info!("Creating remedial");

    let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM competency_elements WHERE id = ?")
        .bind(element_id)
        .fetch_optional(pool)
        .await?;

    if exists.is_none() {
        return Err(AppError::Validation(format!(
            "Competency element with id {} does not exist",
            element_id
        )));
    }

    let res = sqlx::query(
        "INSERT INTO remedials (element_id, completed, evaluated_at)
         VALUES (?, ?, ?)",
    )
    .bind(element_id)
    .bind(completed)
    .bind(evaluated_at)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[derive(Debug, Default)]
pub struct RemedialChanges {
    pub completed: Option<bool>,
    pub evaluated_at: Option<NaiveDateTime>,
}

impl RemedialChanges {
    pub fn is_empty(&self) -> bool {
        self.completed.is_none() && self.evaluated_at.is_none()
    }
}

#[instrument]
pub async fn update_remedial(
    pool: &Pool<Sqlite>,
    remedial_id: i64,
    changes: RemedialChanges,
) -> Result<(), AppError> {
    info!("Updating remedial");
    let result = sqlx::query(
        "UPDATE remedials
         SET completed = COALESCE(?, completed),
             evaluated_at = COALESCE(?, evaluated_at)
         WHERE id = ?",
    )
    .bind(changes.completed)
    .bind(changes.evaluated_at)
    .bind(remedial_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Remedial with id {} not found in database",
            remedial_id
        )));
    }

    Ok(())
}

#[instrument]
pub async fn delete_remedial(pool: &Pool<Sqlite>, remedial_id: i64) -> Result<(), AppError> {
    info!("Deleting remedial");
    let result = sqlx::query("DELETE FROM remedials WHERE id = ?")
        .bind(remedial_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Remedial with id {} not found in database",
            remedial_id
        )));
    }

    Ok(())
}
