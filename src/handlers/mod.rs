//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives request data through the `Api*` extractors and `RequestContext`
//! 2. Delegates to a service
//! 3. Returns an `ApiResponse` envelope or an `AppError`

/// `/api/v2/advanced/*` endpoints
pub mod advanced;
/// Liveness probe
pub mod health;
/// `/api/v2/*` endpoints
pub mod primary;
