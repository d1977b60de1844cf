//! Primary gateway handlers (`/api/v2/*`).
//!
//! - GET /api/v2/{dns,whois,blacklist,ssl,complete,scan}?domain= - Cache-or-fetch lookups
//! - POST /api/v2/bulk - One lookup kind over up to 50 domains
//! - GET /api/v2/history - Paginated lookup history
//! - GET /api/v2/usage - 30-day usage summary
//! - GET|POST|DELETE /api/v2/domains - Saved domains

use axum::{Extension, extract::State, http::StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::auth::RequestContext;
use crate::models::analysis::{AnalysisKind, HistoryRecord, UsageSummary};
use crate::models::saved_domain::{SaveDomainRequest, SavedDomain};
use crate::models::webhook::WebhookEvent;
use crate::response::ApiResponse;
use crate::services::{analysis_service, domain_service, history_service, webhook_service};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DomainQuery {
    pub domain: Option<String>,
}

async fn lookup(
    state: &AppState,
    ctx: &RequestContext,
    kind: AnalysisKind,
    query: DomainQuery,
) -> Result<ApiResponse<Value>, AppError> {
    let analysis = analysis_service::analyze(state, ctx, kind, query.domain.as_deref()).await?;
    Ok(ApiResponse::cached(analysis.data, analysis.from_cache))
}

pub async fn dns(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(query): ApiQuery<DomainQuery>,
) -> Result<ApiResponse<Value>, AppError> {
    lookup(&state, &ctx, AnalysisKind::Dns, query).await
}

pub async fn whois(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(query): ApiQuery<DomainQuery>,
) -> Result<ApiResponse<Value>, AppError> {
    lookup(&state, &ctx, AnalysisKind::Whois, query).await
}

pub async fn blacklist(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(query): ApiQuery<DomainQuery>,
) -> Result<ApiResponse<Value>, AppError> {
    lookup(&state, &ctx, AnalysisKind::Blacklist, query).await
}

pub async fn ssl(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(query): ApiQuery<DomainQuery>,
) -> Result<ApiResponse<Value>, AppError> {
    lookup(&state, &ctx, AnalysisKind::Ssl, query).await
}

/// Complete scan, served under both `/complete` and `/scan`.
///
/// A fresh (non-cached) scan fires `scan.completed` to the caller's webhooks
/// in the background.
///
/// # Response
///
/// ```json
/// {
///   "success": true,
///   "data": {
///     "domain": "example.com",
///     "dns": { ... },
///     "whois": { ... },
///     "blacklist": { ... },
///     "ssl": { "error": "..." },
///     "execution_time_ms": 812
///   },
///   "from_cache": false
/// }
/// ```
pub async fn complete(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(query): ApiQuery<DomainQuery>,
) -> Result<ApiResponse<Value>, AppError> {
    let analysis =
        analysis_service::analyze(&state, &ctx, AnalysisKind::Complete, query.domain.as_deref())
            .await?;

    if !analysis.from_cache {
        let user_id = ctx.user_id();
        let data = json!({
            "domain": analysis.data.get("domain").cloned().unwrap_or(Value::Null),
            "scan": analysis.data.clone(),
        });
        tokio::spawn(async move {
            webhook_service::notify(&state, user_id, WebhookEvent::ScanCompleted, data).await;
        });
    }

    Ok(ApiResponse::cached(analysis.data, analysis.from_cache))
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default = "default_bulk_kind", rename = "type")]
    pub kind: AnalysisKind,
}

fn default_bulk_kind() -> AnalysisKind {
    AnalysisKind::Dns
}

/// Run one lookup kind over a list of domains.
///
/// # Request Body
///
/// ```json
/// { "domains": ["example.com", "example.org"], "type": "dns" }
/// ```
///
/// # Response
///
/// Each domain maps to its lookup result or to `{ "error": "..." }`.
/// More than 50 domains is a 400 before anything is looked up.
pub async fn bulk(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiJson(request): ApiJson<BulkRequest>,
) -> Result<ApiResponse<Value>, AppError> {
    let results = analysis_service::bulk(&state, &ctx, request.kind, &request.domains).await?;
    Ok(ApiResponse::success(Value::Object(results)))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub domain: Option<String>,
}

pub async fn history(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(params): ApiQuery<HistoryParams>,
) -> Result<ApiResponse<Vec<HistoryRecord>>, AppError> {
    let (records, pagination) =
        history_service::list_history(&state, &ctx, params.limit, params.offset, params.domain)
            .await?;
    Ok(ApiResponse::paginated(records, pagination))
}

pub async fn usage(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<ApiResponse<UsageSummary>, AppError> {
    let summary = history_service::usage_summary(&state, &ctx).await?;
    Ok(ApiResponse::success(summary))
}

pub async fn list_domains(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<ApiResponse<Vec<SavedDomain>>, AppError> {
    let domains = domain_service::list_domains(&state, ctx.user_id()).await?;
    Ok(ApiResponse::success(domains))
}

/// Save a domain for the caller. Returns 201, or 409 if already saved.
pub async fn save_domain(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiJson(request): ApiJson<SaveDomainRequest>,
) -> Result<(StatusCode, ApiResponse<SavedDomain>), AppError> {
    let saved = domain_service::save_domain(&state, ctx.user_id(), request).await?;
    Ok((StatusCode::CREATED, ApiResponse::success(saved)))
}

pub async fn delete_domain(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<ApiResponse<Value>, AppError> {
    domain_service::delete_domain(&state, ctx.user_id(), id).await?;
    Ok(ApiResponse::success(json!({ "deleted": id })))
}

#[derive(Debug, Deserialize)]
pub struct DomainIdQuery {
    pub id: Option<Uuid>,
}

/// `DELETE /api/v2/domains?id=` form of [`delete_domain`].
pub async fn delete_domain_by_query(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    ApiQuery(query): ApiQuery<DomainIdQuery>,
) -> Result<ApiResponse<Value>, AppError> {
    let id = query
        .id
        .ok_or_else(|| AppError::invalid("Domain id is required"))?;
    domain_service::delete_domain(&state, ctx.user_id(), id).await?;
    Ok(ApiResponse::success(json!({ "deleted": id })))
}
