use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;

#[instrument]
pub async fn tokens_for(pool: &Pool<Sqlite>, user_id: i64) -> Result<Vec<String>, AppError> {
    info!("Fetching device tokens for user");
    let rows: Vec<(String,)> = sqlx::query_as("SELECT token FROM device_tokens WHERE user_id = ?")
        .bind(user_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(|row| row.0).collect())
}

/// Registers a token for a user. A token already registered to a different
/// user is re-associated; a device belongs to whoever logged in on it last.
#[instrument(skip(token))]
pub async fn upsert_token(pool: &Pool<Sqlite>, user_id: i64, token: &str) -> Result<(), AppError> {
    info!("Registering device token");
    sqlx::query(
        "INSERT INTO device_tokens (token, user_id) VALUES (?, ?)
         ON CONFLICT (token) DO UPDATE SET user_id = excluded.user_id",
    )
    .bind(token)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(())
}

#[instrument(skip(token))]
pub async fn remove_token(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Removing device token");
    sqlx::query("DELETE FROM device_tokens WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}
