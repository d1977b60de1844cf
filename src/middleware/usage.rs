//! Per-request usage log feeding `GET /api/v2/usage`.

use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::middleware::auth::RequestContext;
use crate::models::analysis::NewUsageRecord;
use crate::response::CacheStatus;
use crate::services::history_service;
use crate::state::AppState;

pub async fn usage_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ctx) = request.extensions().get::<RequestContext>().cloned() else {
        return next.run(request).await;
    };
    let endpoint = request.uri().path().to_string();
    let method = request.method().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let from_cache = response
        .extensions()
        .get::<CacheStatus>()
        .is_some_and(|status| status.0);

    history_service::record_usage(
        &state,
        NewUsageRecord {
            api_key_id: ctx.api_key.id,
            user_id: ctx.user.id,
            endpoint,
            method,
            status_code: i32::from(response.status().as_u16()),
            from_cache,
            execution_time_ms: i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX),
        },
    );

    response
}
