use std::path::Path;

use tracing::{info, warn};

use crate::notifications::DEFAULT_EXPO_PUSH_URL;

pub fn load_environment() -> Result<(), Box<dyn std::error::Error>> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        warn!("Warning: Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}

/// Runtime settings resolved once at startup, after the env files are in.
pub struct AppConfig {
    pub database_url: String,
    /// Override lets tests and self-hosted push gateways point the sender
    /// somewhere other than Expo's hosted endpoint.
    pub push_url: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: dotenvy::var("DATABASE_URL").unwrap_or_default(),
            push_url: dotenvy::var("EXPO_PUSH_URL")
                .unwrap_or_else(|_| DEFAULT_EXPO_PUSH_URL.to_string()),
        }
    }
}
