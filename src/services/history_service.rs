//! Analysis history and request usage.
//!
//! Both logs are written from detached tasks: a failed insert is logged and
//! the response the caller receives is unaffected.

use chrono::TimeDelta;

use crate::error::AppError;
use crate::middleware::auth::RequestContext;
use crate::models::analysis::{
    AnalysisKind, HistoryQuery, HistoryRecord, NewHistoryRecord, NewUsageRecord, UsageSummary,
};
use crate::response::Pagination;
use crate::state::AppState;

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 100;
pub const USAGE_PERIOD_DAYS: i64 = 30;

pub fn record_analysis(
    state: &AppState,
    ctx: &RequestContext,
    kind: AnalysisKind,
    domain: &str,
    result: &serde_json::Value,
    from_cache: bool,
) {
    let record = NewHistoryRecord {
        user_id: ctx.user.id,
        api_key_id: ctx.api_key.id,
        domain: domain.to_string(),
        analysis_type: kind.to_string(),
        result: result.clone(),
        from_cache,
        ip_address: ctx.ip_address.clone(),
        user_agent: ctx.user_agent.clone(),
    };
    let history = state.stores.history.clone();
    let at = state.now();

    tokio::spawn(async move {
        if let Err(e) = history.append(record, at).await {
            tracing::warn!(error = %e, "Failed to write analysis history");
        }
    });
}

pub fn record_usage(state: &AppState, record: NewUsageRecord) {
    let usage = state.stores.usage.clone();
    let at = state.now();

    tokio::spawn(async move {
        if let Err(e) = usage.record(record, at).await {
            tracing::warn!(error = %e, "Failed to write usage record");
        }
    });
}

/// One page of the caller's history, newest first.
///
/// `limit` defaults to 50 and is clamped to 1..=100; `offset` defaults to 0.
pub async fn list_history(
    state: &AppState,
    ctx: &RequestContext,
    limit: Option<i64>,
    offset: Option<i64>,
    domain: Option<String>,
) -> Result<(Vec<HistoryRecord>, Pagination), AppError> {
    let limit = limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let offset = offset.unwrap_or(0).max(0);
    let domain = domain
        .filter(|d| !d.trim().is_empty())
        .map(|d| crate::domain_name::normalize(&d))
        .transpose()?;

    let query = HistoryQuery {
        user_id: ctx.user.id,
        domain,
        limit,
        offset,
    };
    let (records, total) = state.stores.history.list(&query).await?;

    Ok((records, Pagination::new(total, limit, offset)))
}

pub async fn usage_summary(
    state: &AppState,
    ctx: &RequestContext,
) -> Result<UsageSummary, AppError> {
    let since = state.now() - TimeDelta::days(USAGE_PERIOD_DAYS);
    let mut summary = state.stores.usage.summary(ctx.user.id, since).await?;
    summary.period_days = USAGE_PERIOD_DAYS;
    summary.avg_execution_time = (summary.avg_execution_time * 100.0).round() / 100.0;
    Ok(summary)
}
