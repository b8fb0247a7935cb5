use rocket::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{instrument, warn};

use crate::models::NotificationKind;

pub const DEFAULT_EXPO_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Classification of a single delivery attempt. Only an explicit
/// "unregistered" answer from the transport may remove a token; everything
/// unrecognized is transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    InvalidToken,
    TransientFailure,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub kind: NotificationKind,
    pub element_id: i64,
}

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, token: &str, payload: &PushPayload) -> DeliveryOutcome;
}

/// Push delivery through the Expo push HTTP API.
pub struct ExpoPushClient {
    client: reqwest::Client,
    url: String,
}

impl ExpoPushClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl Default for ExpoPushClient {
    fn default() -> Self {
        Self::new(DEFAULT_EXPO_PUSH_URL)
    }
}

#[async_trait]
impl PushSender for ExpoPushClient {
    #[instrument(skip_all, fields(element_id = payload.element_id, kind = payload.kind.as_str()))]
    async fn send(&self, token: &str, payload: &PushPayload) -> DeliveryOutcome {
        let message = serde_json::json!({
            "to": token,
            "title": payload.title,
            "body": payload.body,
            "data": {
                "kind": payload.kind.as_str(),
                "element_id": payload.element_id,
            },
        });

        let response = match self
            .client
            .post(&self.url)
            .json(&message)
            .timeout(SEND_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Push request failed to reach the push service");
                return DeliveryOutcome::TransientFailure;
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "Push service returned a non-success status");
            return DeliveryOutcome::TransientFailure;
        }

        match response.json::<Value>().await {
            Ok(body) => classify_ticket(&body),
            Err(e) => {
                warn!(error = %e, "Push service response was not valid JSON");
                DeliveryOutcome::TransientFailure
            }
        }
    }
}

/// Expo answers each message with a ticket:
/// `{"data": {"status": "ok"}}` on acceptance, or
/// `{"data": {"status": "error", "details": {"error": "DeviceNotRegistered"}}}`
/// when the token is no longer valid.
fn classify_ticket(body: &Value) -> DeliveryOutcome {
    let ticket = &body["data"];
    match ticket["status"].as_str() {
        Some("ok") => DeliveryOutcome::Delivered,
        Some("error") => {
            if ticket["details"]["error"].as_str() == Some("DeviceNotRegistered") {
                DeliveryOutcome::InvalidToken
            } else {
                DeliveryOutcome::TransientFailure
            }
        }
        _ => DeliveryOutcome::TransientFailure,
    }
}
