use crate::error::AppError;
use crate::notifications::sender::{DeliveryOutcome, PushPayload, PushSender};
use crate::notifications::tokens::upsert_token;
use crate::notifications::{NotificationEngine, NotificationScheduler};
use chrono::{Duration, Utc};
use rocket::local::asynchronous::Client;
use sqlx::{Pool, Sqlite, sqlite::SqlitePoolOptions};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};

static INIT: Once = Once::new();

pub struct TestUser {
    pub email: String,
    pub name: String,
}

pub struct TestCourse {
    pub name: String,
    pub teacher_email: String,
}

pub struct TestElement {
    pub course_name: String,
    pub description: String,
    pub due_in_days: Option<i64>,
    pub completed: bool,
}

pub struct TestKnowledge {
    pub element_description: String,
    pub description: String,
    pub completed: bool,
}

pub struct TestDevice {
    pub user_email: String,
    pub token: String,
}

#[derive(Default)]
pub struct TestDbBuilder {
    users: Vec<TestUser>,
    courses: Vec<TestCourse>,
    elements: Vec<TestElement>,
    knowledge: Vec<TestKnowledge>,
    devices: Vec<TestDevice>,
}

impl TestDbBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn teacher(mut self, email: &str, name: &str) -> Self {
        self.users.push(TestUser {
            email: email.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn course(mut self, name: &str, teacher_email: &str) -> Self {
        self.courses.push(TestCourse {
            name: name.to_string(),
            teacher_email: teacher_email.to_string(),
        });
        self
    }

    /// `due_in_days` is relative to now: negative is past due, `None` leaves
    /// the element without a deadline.
    pub fn element(
        mut self,
        course_name: &str,
        description: &str,
        due_in_days: Option<i64>,
        completed: bool,
    ) -> Self {
        self.elements.push(TestElement {
            course_name: course_name.to_string(),
            description: description.to_string(),
            due_in_days,
            completed,
        });
        self
    }

    pub fn knowledge(
        mut self,
        element_description: &str,
        description: &str,
        completed: bool,
    ) -> Self {
        self.knowledge.push(TestKnowledge {
            element_description: element_description.to_string(),
            description: description.to_string(),
            completed,
        });
        self
    }

    pub fn device(mut self, user_email: &str, token: &str) -> Self {
        self.devices.push(TestDevice {
            user_email: user_email.to_string(),
            token: token.to_string(),
        });
        self
    }

    pub async fn build(self) -> Result<TestDb, AppError> {
        INIT.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });

        // A single connection so every query sees the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let mut user_ids: HashMap<String, i64> = HashMap::new();
        let mut course_ids: HashMap<String, i64> = HashMap::new();
        let mut element_ids: HashMap<String, i64> = HashMap::new();

        for user in &self.users {
            let res = sqlx::query("INSERT INTO users (email, name) VALUES (?, ?)")
                .bind(&user.email)
                .bind(&user.name)
                .execute(&pool)
                .await?;
            user_ids.insert(user.email.clone(), res.last_insert_rowid());
        }

        for course in &self.courses {
            let teacher_id = user_ids[&course.teacher_email];
            let res = sqlx::query("INSERT INTO courses (name, teacher_id) VALUES (?, ?)")
                .bind(&course.name)
                .bind(teacher_id)
                .execute(&pool)
                .await?;
            course_ids.insert(course.name.clone(), res.last_insert_rowid());
        }

        for element in &self.elements {
            let course_id = course_ids[&element.course_name];
            let due_date = element
                .due_in_days
                .map(|days| (Utc::now() + Duration::days(days)).naive_utc());
            let res = sqlx::query(
                "INSERT INTO competency_elements (course_id, description, due_date, completed)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(course_id)
            .bind(&element.description)
            .bind(due_date)
            .bind(element.completed)
            .execute(&pool)
            .await?;
            element_ids.insert(element.description.clone(), res.last_insert_rowid());
        }

        for knowledge in &self.knowledge {
            let element_id = element_ids[&knowledge.element_description];
            sqlx::query(
                "INSERT INTO minimum_knowledge (element_id, description, completed)
                 VALUES (?, ?, ?)",
            )
            .bind(element_id)
            .bind(&knowledge.description)
            .bind(knowledge.completed)
            .execute(&pool)
            .await?;
        }

        for device in &self.devices {
            let user_id = user_ids[&device.user_email];
            upsert_token(&pool, user_id, &device.token).await?;
        }

        Ok(TestDb {
            pool,
            user_ids,
            course_ids,
            element_ids,
        })
    }
}

pub struct TestDb {
    pub pool: Pool<Sqlite>,
    user_ids: HashMap<String, i64>,
    course_ids: HashMap<String, i64>,
    element_ids: HashMap<String, i64>,
}

impl TestDb {
    pub fn user_id(&self, email: &str) -> i64 {
        self.user_ids[email]
    }

    pub fn course_id(&self, name: &str) -> i64 {
        self.course_ids[name]
    }

    pub fn element_id(&self, description: &str) -> i64 {
        self.element_ids[description]
    }

    /// (user_id, element_id, kind) for every history row, oldest first.
    pub async fn history_rows(&self) -> Vec<(i64, i64, String)> {
        sqlx::query_as("SELECT user_id, element_id, kind FROM notification_history ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .expect("Failed to read notification history")
    }

    pub async fn device_tokens(&self, email: &str) -> Vec<String> {
        crate::notifications::tokens::tokens_for(&self.pool, self.user_id(email))
            .await
            .expect("Failed to read device tokens")
    }
}

/// Scripted stand-in for the push transport: outcomes keyed by token,
/// defaulting to Delivered, with every attempted send recorded.
#[derive(Default)]
pub struct FakeSender {
    outcomes: Mutex<HashMap<String, DeliveryOutcome>>,
    sent: Mutex<Vec<(String, PushPayload)>>,
}

impl FakeSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_outcome(&self, token: &str, outcome: DeliveryOutcome) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(token.to_string(), outcome);
    }

    pub fn sent(&self) -> Vec<(String, PushPayload)> {
        self.sent.lock().unwrap().clone()
    }
}

#[rocket::async_trait]
impl PushSender for FakeSender {
    async fn send(&self, token: &str, payload: &PushPayload) -> DeliveryOutcome {
        self.sent
            .lock()
            .unwrap()
            .push((token.to_string(), payload.clone()));
        self.outcomes
            .lock()
            .unwrap()
            .get(token)
            .copied()
            .unwrap_or(DeliveryOutcome::Delivered)
    }
}

pub fn engine_with_sender(db: &TestDb, sender: Arc<FakeSender>) -> NotificationEngine {
    NotificationEngine::new(db.pool.clone(), sender)
}

pub async fn setup_test_client(db: &TestDb, sender: Arc<FakeSender>) -> Client {
    let engine = Arc::new(NotificationEngine::new(db.pool.clone(), sender));
    let scheduler = NotificationScheduler::new(Arc::clone(&engine));
    let rocket = crate::init_rocket(db.pool.clone(), engine, scheduler).await;

    Client::tracked(rocket)
        .await
        .expect("Failed to build test client")
}
