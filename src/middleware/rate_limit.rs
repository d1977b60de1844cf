//! Hourly rate limiting for authenticated requests.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::middleware::auth::RequestContext;
use crate::services::rate_limiter::{self, RateLimitDecision};
use crate::state::AppState;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Count the request against the key's hourly ceiling.
///
/// Runs after [`auth_middleware`](crate::middleware::auth::auth_middleware).
/// Both admitted and rejected responses carry the `X-RateLimit-*` headers.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ctx = request
        .extensions()
        .get::<RequestContext>()
        .ok_or_else(|| AppError::Internal("rate limiter ran without a request context".into()))?;

    let decision = rate_limiter::acquire(
        state.stores.rate_limits.as_ref(),
        ctx.api_key.id,
        ctx.api_key.rate_limit_per_hour,
        state.now(),
    )
    .await?;

    let mut response = if decision.admitted {
        next.run(request).await
    } else {
        AppError::RateLimited {
            limit: decision.limit,
        }
        .into_response()
    };

    apply_headers(response.headers_mut(), &decision);
    Ok(response)
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(decision.reset));
}
