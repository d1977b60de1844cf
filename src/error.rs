//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::response::{ErrorBody, PrettyJson};

/// Application-wide error type.
///
/// Both gateways render every variant through the same envelope:
///
/// ```json
/// {
///   "success": false,
///   "error": { "code": "unauthorized", "message": "Invalid API key" }
/// }
/// ```
///
/// # Error Categories
///
/// - **Authentication**: missing, unknown or expired API keys, inactive accounts
/// - **Quota**: hourly rate limit exhausted
/// - **Routing**: unknown resources and wrong HTTP methods
/// - **Validation**: malformed input, bad domains, bad JSON bodies
/// - **Upstream**: lookup providers failing or timing out
/// - **Internal**: database errors and anything unexpected (details are logged, never returned)
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No API key was presented.
    #[error("API key required")]
    MissingApiKey,

    /// API key is unknown or no longer active.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// API key has an expiry timestamp in the past.
    #[error("API key has expired")]
    ExpiredApiKey,

    /// The user owning the key is not active.
    #[error("Account is not active")]
    AccountInactive,

    /// The hourly ceiling of the key is already met.
    #[error("Rate limit exceeded: {limit} requests per hour")]
    RateLimited { limit: i32 },

    /// Unknown resource, unknown id, or a resource owned by someone else.
    #[error("{0}")]
    NotFound(String),

    /// The resource exists but not for this HTTP method.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// Request body or parameters are invalid.
    #[error("{0}")]
    InvalidRequest(String),

    /// Webhook URL failed validation.
    #[error("Invalid webhook URL: {0}")]
    InvalidWebhookUrl(String),

    /// The request conflicts with existing state (e.g. a domain already saved).
    #[error("{0}")]
    Conflict(String),

    /// A lookup provider or external service failed.
    #[error("{0}")]
    UpstreamFailure(String),

    /// A lookup provider did not answer before the deadline.
    #[error("{0}")]
    UpstreamTimeout(String),

    /// Unexpected failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(resource: &str) -> Self {
        AppError::NotFound(format!("{resource} not found"))
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        AppError::InvalidRequest(msg.into())
    }

    /// Message safe to show to the caller. Database and internal details are
    /// replaced by a generic text.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// HTTP status and machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::MissingApiKey | AppError::InvalidApiKey | AppError::ExpiredApiKey => {
                (StatusCode::UNAUTHORIZED, "unauthorized")
            }
            AppError::AccountInactive => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed"),
            AppError::InvalidRequest(_) | AppError::InvalidWebhookUrl(_) => {
                (StatusCode::BAD_REQUEST, "bad_request")
            }
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::UpstreamFailure(_) => (StatusCode::BAD_GATEWAY, "upstream_failure"),
            AppError::UpstreamTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout"),
            AppError::Database(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// Database and internal errors are logged here and replaced by a generic
/// message so that no SQL, hostnames or stack details reach the client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        match &self {
            AppError::Database(e) => tracing::error!(error = %e, "Database error"),
            AppError::Internal(msg) => tracing::error!(error = %msg, "Internal error"),
            AppError::UpstreamFailure(msg) | AppError::UpstreamTimeout(msg) => {
                tracing::warn!(error = %msg, code, "Upstream error")
            }
            _ => {}
        }

        let message = self.public_message();

        (status, PrettyJson(ErrorBody::new(code, message))).into_response()
    }
}
