//! Webhook models for endpoint registration and event delivery.
//!
//! # Webhook Flow
//!
//! 1. A user registers an endpoint via `POST /api/v2/advanced/webhooks`
//! 2. The server generates a secret for HMAC signature verification
//! 3. When a bulk job or schedule finishes, subscribed endpoints receive a signed payload
//! 4. The receiver verifies the signature using the secret
//!
//! # Security
//!
//! - Secrets are only shown once during registration
//! - Payloads are signed using HMAC-SHA256
//! - HTTPS is required except for localhost endpoints

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events an endpoint can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEvent {
    #[serde(rename = "scan.completed")]
    ScanCompleted,
    #[serde(rename = "bulk.completed")]
    BulkCompleted,
    #[serde(rename = "schedule.completed")]
    ScheduleCompleted,
    #[serde(rename = "webhook.test")]
    Test,
}

impl WebhookEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            WebhookEvent::ScanCompleted => "scan.completed",
            WebhookEvent::BulkCompleted => "bulk.completed",
            WebhookEvent::ScheduleCompleted => "schedule.completed",
            WebhookEvent::Test => "webhook.test",
        }
    }
}

impl FromStr for WebhookEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scan.completed" => Ok(WebhookEvent::ScanCompleted),
            "bulk.completed" => Ok(WebhookEvent::BulkCompleted),
            "schedule.completed" => Ok(WebhookEvent::ScheduleCompleted),
            "webhook.test" => Ok(WebhookEvent::Test),
            other => Err(format!("unknown webhook event: {other}")),
        }
    }
}

/// Webhook endpoint registered by a user.
///
/// The `secret` is stored in plaintext (required for HMAC generation)
/// but never returned in list/get operations.
#[derive(Debug, Clone)]
pub struct WebhookEndpoint {
    pub id: Uuid,
    pub user_id: Uuid,
    pub url: String,
    pub events: Vec<WebhookEvent>,
    pub secret: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookEndpoint {
    pub fn subscribes_to(&self, event: WebhookEvent) -> bool {
        self.is_active && (event == WebhookEvent::Test || self.events.contains(&event))
    }
}

/// Request to register a new webhook endpoint.
///
/// ```json
/// {
///   "url": "https://example.com/webhook",
///   "events": ["bulk.completed", "schedule.completed"]
/// }
/// ```
///
/// An empty or missing `events` list subscribes to every completion event.
#[derive(Debug, Deserialize)]
pub struct WebhookEndpointRequest {
    pub url: String,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
}

/// Partial update for an endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateWebhookRequest {
    pub url: Option<String>,
    pub events: Option<Vec<WebhookEvent>>,
    pub is_active: Option<bool>,
}

/// Body of `POST /webhooks/test`.
#[derive(Debug, Deserialize)]
pub struct TestWebhookRequest {
    pub webhook_id: Uuid,
}

/// Response when registering or retrieving a webhook endpoint.
///
/// The `secret` field is ONLY included when creating a new endpoint.
#[derive(Debug, Serialize)]
pub struct WebhookEndpointResponse {
    pub id: Uuid,
    pub url: String,
    pub events: Vec<WebhookEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<WebhookEndpoint> for WebhookEndpointResponse {
    fn from(endpoint: WebhookEndpoint) -> Self {
        Self {
            id: endpoint.id,
            url: endpoint.url,
            events: endpoint.events,
            secret: None,
            is_active: endpoint.is_active,
            created_at: endpoint.created_at,
            updated_at: endpoint.updated_at,
        }
    }
}

impl WebhookEndpointResponse {
    /// Create response with secret included (only for registration).
    pub fn with_secret(mut self, secret: String) -> Self {
        self.secret = Some(secret);
        self
    }
}

/// One delivery attempt, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event: WebhookEvent,
    pub payload: serde_json::Value,
    pub response_status: Option<i32>,
    pub response_body: Option<String>,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

/// Webhook payload sent to the registered endpoint.
///
/// ```json
/// {
///   "event_type": "bulk.completed",
///   "event_id": "550e8400-e29b-41d4-a716-446655440000",
///   "created_at": "2025-01-15T10:30:00Z",
///   "data": { "job_id": "...", "status": "completed", "processed": 10 }
/// }
/// ```
///
/// The request carries an `X-Webhook-Signature: sha256=<hex>` header computed
/// as HMAC-SHA256(secret, body).
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event_type: WebhookEvent,
    pub event_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl WebhookPayload {
    pub fn new(event_id: Uuid, event_type: WebhookEvent, data: serde_json::Value) -> Self {
        Self {
            event_type,
            event_id,
            created_at: Utc::now(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_use_dotted_form() {
        let json = serde_json::to_value(WebhookEvent::BulkCompleted).unwrap();
        assert_eq!(json, "bulk.completed");
        assert_eq!(
            "schedule.completed".parse::<WebhookEvent>().unwrap(),
            WebhookEvent::ScheduleCompleted
        );
    }

    #[test]
    fn inactive_endpoints_receive_nothing() {
        let endpoint = WebhookEndpoint {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            url: "https://example.com/hook".into(),
            events: vec![WebhookEvent::BulkCompleted],
            secret: "s".into(),
            is_active: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(!endpoint.subscribes_to(WebhookEvent::BulkCompleted));
    }
}
