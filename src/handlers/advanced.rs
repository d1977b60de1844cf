//! Advanced gateway handlers (`/api/v2/advanced/*`).
//!
//! Bulk jobs, webhook endpoints, schedules, screenshots and competitive
//! analysis. Everything is scoped to the authenticated user; another user's
//! resource answers 404.

use axum::{Extension, extract::State, http::StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::handlers::primary::DomainQuery;
use crate::middleware::auth::RequestContext;
use crate::models::bulk_job::{BulkJobResponse, CreateBulkJobRequest};
use crate::models::schedule::{
    CreateScheduleRequest, Schedule, ScheduleExecution, UpdateScheduleRequest,
};
use crate::models::webhook::{
    TestWebhookRequest, UpdateWebhookRequest, WebhookDelivery, WebhookEndpointRequest,
    WebhookEndpointResponse,
};
use crate::response::ApiResponse;
use crate::services::screenshot_service::{self, ScreenshotQuery, ScreenshotRequest};
use crate::services::{bulk_job_service, competitive_service, schedule_service, webhook_service};
use crate::state::AppState;

/// `?results` flag. Present without a value means true.
#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    pub results: Option<String>,
}

impl ResultsQuery {
    fn wanted(&self) -> bool {
        self.results
            .as_deref()
            .is_some_and(|v| !matches!(v, "false" | "0"))
    }
}

// ---- bulk jobs ----

/// Queue a background bulk job.
///
/// # Request Body
///
/// ```json
/// { "domains": ["a.com", "b.com"], "type": "complete" }
/// ```
///
/// # Response
///
/// 202 Accepted with the job in `pending` state. Poll `GET /bulk/{id}`.
pub async fn create_bulk_job(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiJson(request): ApiJson<CreateBulkJobRequest>,
) -> Result<(StatusCode, ApiResponse<BulkJobResponse>), AppError> {
    let job = bulk_job_service::create_job(&state, ctx.user_id(), request).await?;
    Ok((StatusCode::ACCEPTED, ApiResponse::success(job)))
}

pub async fn get_bulk_job(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(job_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ResultsQuery>,
) -> Result<ApiResponse<BulkJobResponse>, AppError> {
    let job = bulk_job_service::get_job(&state, ctx.user_id(), job_id, query.wanted()).await?;
    Ok(ApiResponse::success(job))
}

pub async fn cancel_bulk_job(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(job_id): ApiPath<Uuid>,
) -> Result<ApiResponse<BulkJobResponse>, AppError> {
    let job = bulk_job_service::cancel_job(&state, ctx.user_id(), job_id).await?;
    Ok(ApiResponse::success(job))
}

// ---- webhooks ----

/// Register a new webhook endpoint.
///
/// # Request Body
///
/// ```json
/// {
///   "url": "https://example.com/webhook",
///   "events": ["scan.completed", "bulk.completed"]
/// }
/// ```
///
/// # Response
///
/// Returns 201 Created. The `secret` is only returned here.
///
/// # Security
///
/// - HTTPS URLs required (HTTP localhost allowed for development)
/// - Secret is 64-character hex string for HMAC-SHA256
pub async fn create_webhook(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiJson(request): ApiJson<WebhookEndpointRequest>,
) -> Result<(StatusCode, ApiResponse<WebhookEndpointResponse>), AppError> {
    let endpoint =
        webhook_service::create_webhook_endpoint(&state, ctx.user_id(), request).await?;

    Ok((StatusCode::CREATED, ApiResponse::success(endpoint)))
}

/// List the caller's webhook endpoints. Secrets are never included.
pub async fn list_webhooks(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<ApiResponse<Vec<WebhookEndpointResponse>>, AppError> {
    let webhooks = webhook_service::list_webhook_endpoints(&state, ctx.user_id()).await?;

    Ok(ApiResponse::success(webhooks))
}

pub async fn update_webhook(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(webhook_id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateWebhookRequest>,
) -> Result<ApiResponse<WebhookEndpointResponse>, AppError> {
    let endpoint =
        webhook_service::update_webhook_endpoint(&state, ctx.user_id(), webhook_id, request)
            .await?;

    Ok(ApiResponse::success(endpoint))
}

/// Delete a webhook endpoint.
///
/// Delivery history is kept; the endpoint stops receiving events.
pub async fn delete_webhook(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(webhook_id): ApiPath<Uuid>,
) -> Result<ApiResponse<Value>, AppError> {
    webhook_service::delete_webhook_endpoint(&state, ctx.user_id(), webhook_id).await?;

    Ok(ApiResponse::success(json!({ "deleted": webhook_id })))
}

/// Send a signed `webhook.test` event and return the delivery record.
pub async fn test_webhook(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiJson(request): ApiJson<TestWebhookRequest>,
) -> Result<ApiResponse<WebhookDelivery>, AppError> {
    let delivery =
        webhook_service::send_test_event(&state, ctx.user_id(), request.webhook_id).await?;

    Ok(ApiResponse::success(delivery))
}

#[derive(Debug, Deserialize)]
pub struct WebhookLogsQuery {
    pub webhook_id: Option<Uuid>,
}

pub async fn webhook_logs(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(query): ApiQuery<WebhookLogsQuery>,
) -> Result<ApiResponse<Vec<WebhookDelivery>>, AppError> {
    let webhook_id = query
        .webhook_id
        .ok_or_else(|| AppError::invalid("webhook_id parameter is required"))?;
    let deliveries = webhook_service::delivery_logs(&state, ctx.user_id(), webhook_id).await?;

    Ok(ApiResponse::success(deliveries))
}

// ---- schedules ----

pub async fn list_schedules(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<ApiResponse<Vec<Schedule>>, AppError> {
    let schedules = schedule_service::list_schedules(&state, ctx.user_id()).await?;
    Ok(ApiResponse::success(schedules))
}

/// Create a recurring scan.
///
/// # Request Body
///
/// ```json
/// {
///   "name": "Weekly portfolio",
///   "domains": ["example.com"],
///   "frequency": "weekly",
///   "scan_type": "complete"
/// }
/// ```
pub async fn create_schedule(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiJson(request): ApiJson<CreateScheduleRequest>,
) -> Result<(StatusCode, ApiResponse<Schedule>), AppError> {
    let schedule = schedule_service::create_schedule(&state, ctx.user_id(), request).await?;
    Ok((StatusCode::CREATED, ApiResponse::success(schedule)))
}

/// One schedule, or with `?results` its execution history.
pub async fn get_schedule(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(schedule_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ResultsQuery>,
) -> Result<ApiResponse<Value>, AppError> {
    let data = if query.wanted() {
        let executions: Vec<ScheduleExecution> =
            schedule_service::list_executions(&state, ctx.user_id(), schedule_id).await?;
        serde_json::to_value(executions)
    } else {
        let schedule = schedule_service::get_schedule(&state, ctx.user_id(), schedule_id).await?;
        serde_json::to_value(schedule)
    }
    .map_err(|e| AppError::Internal(format!("failed to encode schedule: {e}")))?;

    Ok(ApiResponse::success(data))
}

pub async fn update_schedule(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(schedule_id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateScheduleRequest>,
) -> Result<ApiResponse<Schedule>, AppError> {
    let schedule =
        schedule_service::update_schedule(&state, ctx.user_id(), schedule_id, request).await?;
    Ok(ApiResponse::success(schedule))
}

pub async fn delete_schedule(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(schedule_id): ApiPath<Uuid>,
) -> Result<ApiResponse<Value>, AppError> {
    schedule_service::delete_schedule(&state, ctx.user_id(), schedule_id).await?;
    Ok(ApiResponse::success(json!({ "deleted": schedule_id })))
}

// ---- screenshots ----

pub async fn screenshot(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ScreenshotQuery>,
) -> Result<ApiResponse<Value>, AppError> {
    let request = ScreenshotRequest::from_query(query)?;
    let shot = screenshot_service::capture(&state, &request).await?;
    Ok(ApiResponse::success(shot))
}

/// Mobile, tablet and desktop captures of one domain.
pub async fn responsive_screenshots(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<DomainQuery>,
) -> Result<ApiResponse<Value>, AppError> {
    let domain = screenshot_service::required_domain(query.domain.as_deref())?;
    let shots = screenshot_service::capture_responsive(&state, domain).await?;
    Ok(ApiResponse::success(shots))
}

// ---- competitive ----

#[derive(Debug, Deserialize)]
pub struct CompetitiveRequest {
    #[serde(default)]
    pub domains: Vec<String>,
}

/// Compare 2 to 10 domains by complete scan.
///
/// # Response
///
/// ```json
/// {
///   "success": true,
///   "data": {
///     "domains": { "a.com": { "scan": { ... }, "summary": { "score": 88, ... } } },
///     "comparison": { "ranking": ["a.com", "b.com"], "best": "a.com", ... }
///   }
/// }
/// ```
pub async fn competitive(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiJson(request): ApiJson<CompetitiveRequest>,
) -> Result<ApiResponse<Value>, AppError> {
    let report = competitive_service::compare(&state, &ctx, &request.domains).await?;
    Ok(ApiResponse::success(report))
}
