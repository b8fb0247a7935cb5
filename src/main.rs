#[macro_use]
extern crate rocket;

mod api;
mod db;
mod env;
mod error;
mod models;
mod notifications;
mod telemetry;
mod validation;
#[cfg(test)]
mod test;

use api::{
    api_create_remedial, api_delete_remedial, api_get_all_users, api_get_courses,
    api_get_elements, api_get_knowledge, api_get_notifications, api_get_remedials,
    api_register_device, api_remove_device, api_run_notification_cycle, api_update_course,
    api_update_element, api_update_knowledge_completed, api_update_remedial, api_validate_email,
    health,
};
use env::AppConfig;
use error::AppError;
use notifications::{ExpoPushClient, NotificationEngine, NotificationScheduler};
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket};
use std::sync::Arc;
use telemetry::TelemetryFairing;
use telemetry::init_tracing;
use thiserror::Error;

use sqlx::SqlitePool;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("{0}")]
    Figment(rocket::figment::Error),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

impl From<rocket::figment::Error> for Error {
    fn from(value: rocket::figment::Error) -> Self {
        Error::Figment(value)
    }
}

#[launch]
async fn rocket() -> _ {
    init_tracing();

    if let Err(e) = env::load_environment() {
        warn!("Failed to load environment files: {}", e);
    }

    let config = AppConfig::from_env();

    let pool = SqlitePool::connect(&config.database_url)
        .await
        .expect("Failed to connect to SQLite database");

    info!("Running database migrations...");
    match sqlx::migrate!("./migrations").run(&pool).await {
        Ok(_) => info!("Migrations completed successfully"),
        Err(e) => {
            error!("Failed to run migrations: {}", e);
            panic!("Database migration failed: {}", e);
        }
    }

    let sender = Arc::new(ExpoPushClient::new(config.push_url));
    let engine = Arc::new(NotificationEngine::new(pool.clone(), sender));

    let mut scheduler = NotificationScheduler::new(Arc::clone(&engine));
    scheduler.start();

    init_rocket(pool, engine, scheduler).await
}

pub async fn init_rocket(
    pool: SqlitePool,
    engine: Arc<NotificationEngine>,
    scheduler: NotificationScheduler,
) -> Rocket<Build> {
    info!("Starting competency tracker");

    rocket::build()
        .manage(pool)
        .manage(engine)
        .manage(scheduler)
        .mount(
            "/api",
            routes![
                api_get_all_users,
                api_validate_email,
                api_get_courses,
                api_update_course,
                api_get_elements,
                api_update_element,
                api_get_knowledge,
                api_update_knowledge_completed,
                api_get_remedials,
                api_create_remedial,
                api_update_remedial,
                api_delete_remedial,
                api_register_device,
                api_remove_device,
                api_get_notifications,
                api_run_notification_cycle,
            ],
        )
        .mount("/api", routes![health])
        .attach(TelemetryFairing)
        .attach(AdHoc::on_shutdown("Flush telemetry", |_| {
            Box::pin(async {
                telemetry::shutdown_telemetry();
            })
        }))
}
