//! Business logic layer.
//!
//! Services sit between handlers and stores. Each takes the shared
//! [`AppState`](crate::state::AppState) plus the caller's user id or
//! `RequestContext`, and reports failures as `AppError`.

pub mod analysis_service;
pub mod auth_service;
pub mod bulk_job_service;
pub mod cache_service;
pub mod competitive_service;
pub mod domain_service;
pub mod history_service;
pub mod maintenance;
pub mod rate_limiter;
pub mod schedule_service;
pub mod screenshot_service;
pub mod webhook_service;
