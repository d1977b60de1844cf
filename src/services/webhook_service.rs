//! Webhook service for managing endpoints and sending events.
//!
//! This module handles webhook endpoint registration, event delivery,
//! and HMAC signature generation for secure webhook verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::webhook::{
    UpdateWebhookRequest, WebhookDelivery, WebhookEndpoint, WebhookEndpointRequest,
    WebhookEndpointResponse, WebhookEvent, WebhookPayload,
};
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

const MAX_URL_LEN: usize = 2048;
/// Response bodies are stored for debugging, truncated to this many bytes.
const MAX_LOGGED_BODY: usize = 4096;
pub const DEFAULT_LOG_LIMIT: i64 = 50;

/// Subscriptions used when a registration names no events.
const DEFAULT_EVENTS: [WebhookEvent; 3] = [
    WebhookEvent::ScanCompleted,
    WebhookEvent::BulkCompleted,
    WebhookEvent::ScheduleCompleted,
];

/// Create a new webhook endpoint.
///
/// # Process
///
/// 1. Validate URL format
/// 2. Generate cryptographically secure secret (32 bytes)
/// 3. Store endpoint
/// 4. Return endpoint with secret (only shown once)
pub async fn create_webhook_endpoint(
    state: &AppState,
    user_id: Uuid,
    request: WebhookEndpointRequest,
) -> Result<WebhookEndpointResponse, AppError> {
    validate_webhook_url(&request.url)?;

    let secret = generate_secret();
    let now = state.now();
    let endpoint = WebhookEndpoint {
        id: Uuid::new_v4(),
        user_id,
        url: request.url,
        events: normalize_events(request.events),
        secret: secret.clone(),
        is_active: true,
        created_at: now,
        updated_at: now,
    };

    state.stores.webhooks.insert(&endpoint).await?;
    tracing::info!(webhook_id = %endpoint.id, %user_id, "Webhook endpoint registered");

    Ok(WebhookEndpointResponse::from(endpoint).with_secret(secret))
}

/// List the caller's webhook endpoints. Secrets are never included.
pub async fn list_webhook_endpoints(
    state: &AppState,
    user_id: Uuid,
) -> Result<Vec<WebhookEndpointResponse>, AppError> {
    let endpoints = state.stores.webhooks.list(user_id).await?;
    Ok(endpoints.into_iter().map(Into::into).collect())
}

pub async fn update_webhook_endpoint(
    state: &AppState,
    user_id: Uuid,
    webhook_id: Uuid,
    request: UpdateWebhookRequest,
) -> Result<WebhookEndpointResponse, AppError> {
    let mut endpoint = find_owned(state, user_id, webhook_id).await?;

    if let Some(url) = request.url {
        validate_webhook_url(&url)?;
        endpoint.url = url;
    }
    if let Some(events) = request.events {
        endpoint.events = normalize_events(events);
    }
    if let Some(is_active) = request.is_active {
        endpoint.is_active = is_active;
    }
    endpoint.updated_at = state.now();

    state.stores.webhooks.update(&endpoint).await?;

    Ok(endpoint.into())
}

/// Delete a webhook endpoint (soft delete; deliveries are kept).
pub async fn delete_webhook_endpoint(
    state: &AppState,
    user_id: Uuid,
    webhook_id: Uuid,
) -> Result<(), AppError> {
    if !state.stores.webhooks.delete(user_id, webhook_id).await? {
        return Err(AppError::not_found("Webhook"));
    }
    tracing::info!(%webhook_id, %user_id, "Webhook endpoint deleted");
    Ok(())
}

/// Send a `webhook.test` event to one endpoint and return the logged attempt.
pub async fn send_test_event(
    state: &AppState,
    user_id: Uuid,
    webhook_id: Uuid,
) -> Result<WebhookDelivery, AppError> {
    let endpoint = find_owned(state, user_id, webhook_id).await?;

    let data = serde_json::json!({
        "message": "This is a test webhook delivery",
        "webhook_id": endpoint.id,
    });

    send_webhook(state, &endpoint, WebhookEvent::Test, data).await
}

/// Most recent delivery attempts for one of the caller's endpoints.
pub async fn delivery_logs(
    state: &AppState,
    user_id: Uuid,
    webhook_id: Uuid,
) -> Result<Vec<WebhookDelivery>, AppError> {
    let endpoint = find_owned(state, user_id, webhook_id).await?;
    state
        .stores
        .webhooks
        .deliveries(endpoint.id, DEFAULT_LOG_LIMIT)
        .await
}

/// Deliver `event` to every active endpoint of `user_id` subscribed to it.
///
/// # Error Handling
///
/// - Individual webhook failures are logged but don't fail the overall operation
/// - The caller's work (a finished job or schedule run) stands on its own
pub async fn notify(state: &AppState, user_id: Uuid, event: WebhookEvent, data: serde_json::Value) {
    let endpoints = match state.stores.webhooks.list(user_id).await {
        Ok(endpoints) => endpoints,
        Err(e) => {
            tracing::error!(%user_id, event = event.as_str(), error = %e, "Failed to load webhook endpoints");
            return;
        }
    };

    for endpoint in endpoints.iter().filter(|e| e.subscribes_to(event)) {
        if let Err(e) = send_webhook(state, endpoint, event, data.clone()).await {
            tracing::error!(url = %endpoint.url, error = %e, "Failed to send webhook");
        }
    }
}

/// Send a single webhook with HMAC signature and log the attempt.
///
/// # Headers Sent
///
/// - `Content-Type: application/json`
/// - `X-Webhook-Signature: sha256=<hex>`
/// - `X-Webhook-Event: <event>`
/// - `X-Webhook-Event-Id: <uuid>`
///
/// # Timeout
///
/// `WEBHOOK_TIMEOUT_SECS` per webhook, enforced by the shared client.
async fn send_webhook(
    state: &AppState,
    endpoint: &WebhookEndpoint,
    event: WebhookEvent,
    data: serde_json::Value,
) -> Result<WebhookDelivery, AppError> {
    let event_id = Uuid::new_v4();

    let mut payload = WebhookPayload::new(event_id, event, data);
    payload.created_at = state.now();
    let payload_json = serde_json::to_string(&payload)
        .map_err(|e| AppError::Internal(format!("Failed to serialize webhook payload: {e}")))?;

    let signature = generate_signature(&endpoint.secret, &payload_json);

    let response = state
        .http
        .post(&endpoint.url)
        .header("Content-Type", "application/json")
        .header("X-Webhook-Signature", &signature)
        .header("X-Webhook-Event", event.as_str())
        .header("X-Webhook-Event-Id", event_id.to_string())
        .body(payload_json)
        .send()
        .await;

    let (status, body, success) = match response {
        Ok(resp) => {
            let status = resp.status();
            let body = resp.text().await.ok().map(|b| truncate(b, MAX_LOGGED_BODY));
            (Some(i32::from(status.as_u16())), body, status.is_success())
        }
        Err(e) => {
            tracing::warn!(url = %endpoint.url, error = %e, "Webhook request failed");
            (None, Some(format!("Request failed: {e}")), false)
        }
    };

    let payload_value = serde_json::to_value(&payload)
        .map_err(|e| AppError::Internal(format!("Failed to serialize webhook payload: {e}")))?;

    let delivery = WebhookDelivery {
        id: event_id,
        webhook_id: endpoint.id,
        event,
        payload: payload_value,
        response_status: status,
        response_body: body,
        success,
        created_at: state.now(),
    };

    state.stores.webhooks.record_delivery(&delivery).await?;

    Ok(delivery)
}

async fn find_owned(
    state: &AppState,
    user_id: Uuid,
    webhook_id: Uuid,
) -> Result<WebhookEndpoint, AppError> {
    state
        .stores
        .webhooks
        .get(user_id, webhook_id)
        .await?
        .ok_or_else(|| AppError::not_found("Webhook"))
}

fn normalize_events(events: Vec<WebhookEvent>) -> Vec<WebhookEvent> {
    if events.is_empty() {
        return DEFAULT_EVENTS.to_vec();
    }
    let mut unique = Vec::with_capacity(events.len());
    for event in events {
        if !unique.contains(&event) {
            unique.push(event);
        }
    }
    unique
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut cut = max;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

/// Generate HMAC-SHA256 signature for webhook payload.
///
/// # Format
///
/// `sha256=<hex_encoded_hmac>`
///
/// # Verification
///
/// Receivers should:
/// 1. Extract signature from `X-Webhook-Signature` header
/// 2. Compute HMAC-SHA256(secret, request_body)
/// 3. Compare using constant-time comparison
pub fn generate_signature(secret: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid");
    mac.update(payload.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// 64 hex characters (32 random bytes).
fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// Validate webhook URL format.
///
/// # Rules
///
/// - Must be valid URL
/// - Must be HTTPS (HTTP localhost allowed for development)
/// - Maximum 2048 characters
pub fn validate_webhook_url(url: &str) -> Result<(), AppError> {
    if url.len() > MAX_URL_LEN {
        return Err(AppError::InvalidWebhookUrl(format!(
            "URL exceeds {MAX_URL_LEN} characters"
        )));
    }

    let parsed = url::Url::parse(url)
        .map_err(|_| AppError::InvalidWebhookUrl("Invalid URL format".to_string()))?;

    match parsed.scheme() {
        "https" => Ok(()),
        "http" => match parsed.host_str() {
            Some("localhost" | "127.0.0.1" | "0.0.0.0" | "[::1]") => Ok(()),
            _ => Err(AppError::InvalidWebhookUrl(
                "HTTP is only allowed for localhost. Use HTTPS for production.".to_string(),
            )),
        },
        _ => Err(AppError::InvalidWebhookUrl(
            "URL must use HTTP or HTTPS".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_known_hmac() {
        // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
        assert_eq!(
            generate_signature("key", "The quick brown fox jumps over the lazy dog"),
            "sha256=f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn plain_http_only_for_localhost() {
        assert!(validate_webhook_url("https://hooks.example.com/x").is_ok());
        assert!(validate_webhook_url("http://localhost:8080/hook").is_ok());
        assert!(validate_webhook_url("http://hooks.example.com/x").is_err());
        assert!(validate_webhook_url("ftp://example.com").is_err());
        assert!(validate_webhook_url(&format!("https://e.com/{}", "a".repeat(2048))).is_err());
    }

    #[test]
    fn empty_subscription_means_all_completion_events() {
        assert_eq!(normalize_events(Vec::new()), DEFAULT_EVENTS.to_vec());
        assert_eq!(
            normalize_events(vec![WebhookEvent::BulkCompleted, WebhookEvent::BulkCompleted]),
            vec![WebhookEvent::BulkCompleted]
        );
    }
}
