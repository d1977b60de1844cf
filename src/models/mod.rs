//! Data models.
//!
//! Domain records shared by the stores, services and handlers, plus the
//! request bodies the API accepts.

/// API key and user models
pub mod api_key;
/// Analysis kinds, history and usage records
pub mod analysis;
/// Advanced bulk scan jobs
pub mod bulk_job;
/// Saved-domain bookmarks
pub mod saved_domain;
/// Recurring schedules and executions
pub mod schedule;
/// Webhook endpoints and deliveries
pub mod webhook;
