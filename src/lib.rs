//! Domain Diagnostics API Server
//!
//! A REST gateway for domain lookups: DNS records, WHOIS registration data,
//! DNS blacklist reputation and TLS certificates, plus a combined scan.
//! Callers authenticate with an API key, are rate limited per key and hour,
//! and get cached results where a fresh lookup is not needed.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Storage**: PostgreSQL with sqlx, or in-memory stores without `DATABASE_URL`
//! - **Authentication**: API key digested with HMAC-SHA256 and a server pepper
//! - **Format**: pretty-printed JSON envelopes
//!
//! # Gateways
//!
//! - `/api/v2/*`: single lookups, bulk lookups, history, usage, saved domains
//! - `/api/v2/advanced/*`: bulk jobs, webhooks, schedules, screenshots,
//!   competitive analysis
//! - `/health`: unauthenticated liveness probe

use std::any::Any;

use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

pub mod clock;
pub mod config;
pub mod db;
pub mod domain_name;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod providers;
pub mod response;
pub mod services;
pub mod state;
pub mod store;

use crate::config::Config;
use crate::error::AppError;
use crate::handlers::{advanced, health, primary};
use crate::state::AppState;

/// Build the HTTP application.
///
/// Every `/api/v2` request, including unknown paths and wrong methods, is
/// authenticated and rate limited before it is routed. `/health` is not.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        // Lookups
        .route("/api/v2/dns", get(primary::dns))
        .route("/api/v2/whois", get(primary::whois))
        .route("/api/v2/blacklist", get(primary::blacklist))
        .route("/api/v2/ssl", get(primary::ssl))
        .route("/api/v2/complete", get(primary::complete))
        .route("/api/v2/scan", get(primary::complete))
        .route("/api/v2/bulk", post(primary::bulk))
        // Account data
        .route("/api/v2/history", get(primary::history))
        .route("/api/v2/usage", get(primary::usage))
        .route(
            "/api/v2/domains",
            get(primary::list_domains)
                .post(primary::save_domain)
                .delete(primary::delete_domain_by_query),
        )
        .route("/api/v2/domains/{id}", delete(primary::delete_domain))
        // Advanced: bulk jobs
        .route("/api/v2/advanced/bulk", post(advanced::create_bulk_job))
        .route(
            "/api/v2/advanced/bulk/{id}",
            get(advanced::get_bulk_job).delete(advanced::cancel_bulk_job),
        )
        // Advanced: webhooks
        .route(
            "/api/v2/advanced/webhooks",
            get(advanced::list_webhooks).post(advanced::create_webhook),
        )
        .route("/api/v2/advanced/webhooks/test", post(advanced::test_webhook))
        .route("/api/v2/advanced/webhooks/logs", get(advanced::webhook_logs))
        .route(
            "/api/v2/advanced/webhooks/{id}",
            put(advanced::update_webhook).delete(advanced::delete_webhook),
        )
        // Advanced: schedules
        .route(
            "/api/v2/advanced/schedules",
            get(advanced::list_schedules).post(advanced::create_schedule),
        )
        .route(
            "/api/v2/advanced/schedules/{id}",
            get(advanced::get_schedule)
                .put(advanced::update_schedule)
                .delete(advanced::delete_schedule),
        )
        // Advanced: screenshots and comparison
        .route("/api/v2/advanced/screenshots", get(advanced::screenshot))
        .route(
            "/api/v2/advanced/screenshots/responsive",
            get(advanced::responsive_screenshots),
        )
        .route("/api/v2/advanced/competitive", post(advanced::competitive))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        // Last added runs first: auth, usage, rate limit, handler
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::usage::usage_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    let cors = cors_layer(&state.config);

    Router::new()
        // Public routes (no authentication required)
        .route("/health", get(health::health_check))
        .method_not_allowed_fallback(method_not_allowed)
        .merge(api)
        .layer(axum_middleware::from_fn(
            middleware::preflight::options_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors)
        .with_state(state)
}

async fn not_found() -> AppError {
    AppError::not_found("Endpoint")
}

async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    AppError::Internal(format!("handler panicked: {detail}")).into_response()
}

/// Only origins listed in `CORS_ALLOWED_ORIGINS` get CORS headers.
fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(middleware::auth::API_KEY_HEADER),
        ])
        .expose_headers([
            HeaderName::from_static(middleware::rate_limit::LIMIT_HEADER),
            HeaderName::from_static(middleware::rate_limit::REMAINING_HEADER),
            HeaderName::from_static(middleware::rate_limit::RESET_HEADER),
        ])
}
