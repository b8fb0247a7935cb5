use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use validator::Validate;

use crate::db::{
    CourseChanges, ElementChanges, RemedialChanges, create_remedial, delete_remedial, email_exists,
    get_all_users, get_courses_by_teacher_email, get_elements_by_course, get_knowledge_by_element,
    get_remedials_by_element, get_user, set_knowledge_completed, update_course, update_element,
    update_remedial,
};
use crate::error::AppError;
use crate::models::{
    CompetencyElement, Course, MinimumKnowledge, NotificationRecord, Remedial, User,
};
use crate::notifications::history::notifications_for_user;
use crate::notifications::tokens::{remove_token, upsert_token};
use crate::notifications::{CycleSummary, NotificationEngine};
use crate::validation::{
    AppErrorExt, JsonValidateExt, ToValidationResponse, ValidationResponse,
};

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid"));

#[derive(Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    fn ok(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.to_string(),
        })
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UserData {
    pub id: i64,
    pub email: String,
    pub name: String,
}

impl From<User> for UserData {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
        }
    }
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

#[get("/users")]
pub async fn api_get_all_users(
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<UserData>>, Custom<Json<ValidationResponse>>> {
    let users = get_all_users(db).await.validate_custom()?;
    Ok(Json(users.into_iter().map(UserData::from).collect()))
}

#[derive(Serialize, Deserialize)]
pub struct EmailCheckResponse {
    pub exists: bool,
}

#[get("/validate-email?<email>")]
pub async fn api_validate_email(
    email: &str,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<EmailCheckResponse>, Custom<Json<ValidationResponse>>> {
    if !EMAIL_REGEX.is_match(email) {
        return Err(
            AppError::Validation("A valid email address is required".to_string())
                .to_validation_response(),
        );
    }

    let exists = email_exists(db, email).await.validate_custom()?;
    Ok(Json(EmailCheckResponse { exists }))
}

#[get("/courses?<email>")]
pub async fn api_get_courses(
    email: &str,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Course>>, Custom<Json<ValidationResponse>>> {
    let courses = get_courses_by_teacher_email(db, email)
        .await
        .validate_custom()?;
    Ok(Json(courses))
}

#[derive(Deserialize)]
pub struct CourseUpdateRequest {
    pub remedials_taken: Option<i64>,
    pub elements_completed: Option<i64>,
    pub elements_evaluated: Option<i64>,
    pub active: Option<bool>,
}

#[patch("/course/<id>", data = "<update>")]
pub async fn api_update_course(
    id: i64,
    update: Json<CourseUpdateRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, Custom<Json<ValidationResponse>>> {
    let update = update.into_inner();
    let changes = CourseChanges {
        remedials_taken: update.remedials_taken,
        elements_completed: update.elements_completed,
        elements_evaluated: update.elements_evaluated,
        active: update.active,
    };

    if changes.is_empty() {
        return Err(AppError::Validation(
            "At least one of remedials_taken, elements_completed, elements_evaluated or active must be provided"
                .to_string(),
        )
        .to_validation_response());
    }

    update_course(db, id, changes).await.validate_custom()?;
    Ok(MessageResponse::ok("Course updated successfully"))
}

#[get("/elements?<course>")]
pub async fn api_get_elements(
    course: i64,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<CompetencyElement>>, Custom<Json<ValidationResponse>>> {
    let elements = get_elements_by_course(db, course).await.validate_custom()?;
    Ok(Json(elements))
}

#[derive(Deserialize)]
pub struct ElementUpdateRequest {
    pub evaluated: Option<bool>,
    pub comment: Option<String>,
    pub registered_at: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub knowledge_completed: Option<i64>,
    pub completed: Option<bool>,
}

#[patch("/element/<id>", data = "<update>")]
pub async fn api_update_element(
    id: i64,
    update: Json<ElementUpdateRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, Custom<Json<ValidationResponse>>> {
    let update = update.into_inner();
    let changes = ElementChanges {
        evaluated: update.evaluated,
        comment: update.comment,
        registered_at: update.registered_at.map(|dt| dt.naive_utc()),
        due_date: update.due_date.map(|dt| dt.naive_utc()),
        knowledge_completed: update.knowledge_completed,
        completed: update.completed,
    };

    if changes.is_empty() {
        return Err(AppError::Validation(
            "At least one of evaluated, comment, registered_at, due_date, knowledge_completed or completed must be provided"
                .to_string(),
        )
        .to_validation_response());
    }

    update_element(db, id, changes).await.validate_custom()?;
    Ok(MessageResponse::ok("Competency element updated successfully"))
}

#[get("/knowledge?<element>")]
pub async fn api_get_knowledge(
    element: i64,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<MinimumKnowledge>>, Custom<Json<ValidationResponse>>> {
    let knowledge = get_knowledge_by_element(db, element)
        .await
        .validate_custom()?;
    Ok(Json(knowledge))
}

#[derive(Deserialize)]
pub struct KnowledgeCompletedRequest {
    pub completed: bool,
}

#[patch("/knowledge/<id>/completed", data = "<update>")]
pub async fn api_update_knowledge_completed(
    id: i64,
    update: Json<KnowledgeCompletedRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, Custom<Json<ValidationResponse>>> {
    set_knowledge_completed(db, id, update.completed)
        .await
        .validate_custom()?;
    Ok(MessageResponse::ok("Completion status updated successfully"))
}

#[get("/remedials?<element>")]
pub async fn api_get_remedials(
    element: i64,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Remedial>>, Custom<Json<ValidationResponse>>> {
    let remedials = get_remedials_by_element(db, element)
        .await
        .validate_custom()?;
    Ok(Json(remedials))
}

#[derive(Deserialize, Validate)]
pub struct RemedialCreateRequest {
    #[validate(range(min = 1, message = "element_id must be a positive id"))]
    pub element_id: i64,
    pub completed: bool,
    pub evaluated_at: Option<DateTime<Utc>>,
}

#[post("/remedial", data = "<request>")]
pub async fn api_create_remedial(
    request: Json<RemedialCreateRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<MessageResponse>>, Custom<Json<ValidationResponse>>> {
    let request = request.validate_custom()?;

    create_remedial(
        db,
        request.element_id,
        request.completed,
        request.evaluated_at.map(|dt| dt.naive_utc()),
    )
    .await
    .validate_custom()?;

    Ok(Custom(
        Status::Created,
        MessageResponse::ok("Remedial created successfully"),
    ))
}

#[derive(Deserialize)]
pub struct RemedialUpdateRequest {
    pub completed: Option<bool>,
    pub evaluated_at: Option<DateTime<Utc>>,
}

#[patch("/remedial/<id>", data = "<update>")]
pub async fn api_update_remedial(
    id: i64,
    update: Json<RemedialUpdateRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, Custom<Json<ValidationResponse>>> {
    let update = update.into_inner();
    let changes = RemedialChanges {
        completed: update.completed,
        evaluated_at: update.evaluated_at.map(|dt| dt.naive_utc()),
    };

    if changes.is_empty() {
        return Err(AppError::Validation(
            "At least one of completed or evaluated_at must be provided".to_string(),
        )
        .to_validation_response());
    }

    update_remedial(db, id, changes).await.validate_custom()?;
    Ok(MessageResponse::ok("Remedial updated successfully"))
}

#[delete("/remedial/<id>")]
pub async fn api_delete_remedial(
    id: i64,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, Custom<Json<ValidationResponse>>> {
    delete_remedial(db, id).await.validate_custom()?;
    Ok(MessageResponse::ok("Remedial deleted successfully"))
}

#[derive(Deserialize, Validate)]
pub struct RegisterDeviceRequest {
    #[validate(range(min = 1, message = "user_id must be a positive id"))]
    pub user_id: i64,
    #[validate(length(min = 1, message = "token must not be empty"))]
    pub token: String,
}

#[post("/devices", data = "<request>")]
pub async fn api_register_device(
    request: Json<RegisterDeviceRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<MessageResponse>>, Custom<Json<ValidationResponse>>> {
    let request = request.validate_custom()?;

    get_user(db, request.user_id).await.validate_custom()?;
    upsert_token(db, request.user_id, &request.token)
        .await
        .validate_custom()?;

    Ok(Custom(
        Status::Created,
        MessageResponse::ok("Device token registered"),
    ))
}

#[delete("/devices/<token>")]
pub async fn api_remove_device(
    token: &str,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, Custom<Json<ValidationResponse>>> {
    remove_token(db, token).await.validate_custom()?;
    Ok(MessageResponse::ok("Device token removed"))
}

#[get("/notifications?<user>")]
pub async fn api_get_notifications(
    user: i64,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<NotificationRecord>>, Custom<Json<ValidationResponse>>> {
    let records = notifications_for_user(db, user).await.validate_custom()?;
    Ok(Json(records))
}

/// Manual counterpart of the scheduled cycle; waits for any in-flight cycle
/// before running.
#[post("/notifications/run")]
pub async fn api_run_notification_cycle(
    engine: &State<Arc<NotificationEngine>>,
) -> Result<Json<CycleSummary>, Custom<Json<ValidationResponse>>> {
    let summary = engine.run_cycle().await.validate_custom()?;
    Ok(Json(summary))
}
