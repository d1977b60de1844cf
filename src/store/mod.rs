//! Persistence traits.
//!
//! Each concern the gateway persists has its own trait. Two implementations
//! exist for every trait:
//!
//! - [`postgres::PgStore`]: the production backend over a sqlx pool
//! - [`memory::MemoryStore`]: process-local state used when no database is
//!   configured and by the test suite
//!
//! All methods return [`AppError`] so handlers can propagate with `?`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    analysis::{HistoryQuery, HistoryRecord, NewHistoryRecord, NewUsageRecord, UsageSummary},
    api_key::{ApiKey, KeyStatus, PlanTier, User, UserStatus},
    bulk_job::{BulkJob, JobStatus},
    saved_domain::SavedDomain,
    schedule::{ExecutionStatus, Schedule, ScheduleExecution},
    webhook::{WebhookDelivery, WebhookEndpoint},
};

pub mod memory;
pub mod postgres;

/// API keys and their owners.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a key by digest together with its owning user.
    async fn find_key_by_hash(&self, key_hash: &str) -> Result<Option<(ApiKey, User)>, AppError>;

    async fn touch_last_used(&self, key_id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;

    async fn create_user(
        &self,
        email: &str,
        plan: PlanTier,
        status: UserStatus,
        at: DateTime<Utc>,
    ) -> Result<User, AppError>;

    async fn insert_api_key(&self, key: &ApiKey) -> Result<(), AppError>;

    async fn set_key_status(&self, key_id: Uuid, status: KeyStatus) -> Result<bool, AppError>;

    async fn set_user_status(&self, user_id: Uuid, status: UserStatus) -> Result<bool, AppError>;

    /// Cheap connectivity check for `/health`.
    async fn ping(&self) -> Result<(), AppError>;
}

/// Hourly request counters.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically add one request to the `(key_id, window_start)` counter
    /// unless it already holds `ceiling` requests.
    ///
    /// Returns the count after the increment, or `None` when the request is
    /// refused. Implementations must not split this into a read and a write.
    async fn increment_window(
        &self,
        key_id: Uuid,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        ceiling: i32,
    ) -> Result<Option<i32>, AppError>;

    /// Delete windows that ended before `before`.
    async fn prune_windows(&self, before: DateTime<Utc>) -> Result<u64, AppError>;
}

/// TTL'd lookup results.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Return the payload if present and `expires_at > now`.
    async fn get(&self, key: &str, now: DateTime<Utc>)
    -> Result<Option<serde_json::Value>, AppError>;

    async fn set(
        &self,
        key: &str,
        payload: &serde_json::Value,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn prune(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, record: NewHistoryRecord, at: DateTime<Utc>) -> Result<(), AppError>;

    /// Newest first. Returns the page and the total matching count.
    async fn list(&self, query: &HistoryQuery) -> Result<(Vec<HistoryRecord>, i64), AppError>;
}

#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn record(&self, record: NewUsageRecord, at: DateTime<Utc>) -> Result<(), AppError>;

    async fn summary(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<UsageSummary, AppError>;
}

#[async_trait]
pub trait SavedDomainStore: Send + Sync {
    async fn list(&self, user_id: Uuid) -> Result<Vec<SavedDomain>, AppError>;

    /// Fails with `Conflict` if the user already saved this domain.
    async fn insert(
        &self,
        user_id: Uuid,
        domain: &str,
        label: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<SavedDomain, AppError>;

    /// Returns false when the row does not exist for this user.
    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError>;
}

#[async_trait]
pub trait BulkJobStore: Send + Sync {
    async fn insert(&self, job: &BulkJob) -> Result<(), AppError>;

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<BulkJob>, AppError>;

    async fn status(&self, id: Uuid) -> Result<Option<JobStatus>, AppError>;

    /// Pending → running. Returns false if the job is no longer pending.
    async fn mark_running(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError>;

    async fn record_result(
        &self,
        id: Uuid,
        domain: &str,
        result: serde_json::Value,
        failed: bool,
    ) -> Result<(), AppError>;

    /// Running → `status`. Returns false if the job was cancelled meanwhile.
    async fn finish(&self, id: Uuid, status: JobStatus, at: DateTime<Utc>)
    -> Result<bool, AppError>;

    /// Pending/running → cancelled for the owner. Returns false otherwise.
    async fn cancel(&self, user_id: Uuid, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError>;
}

#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn insert(&self, endpoint: &WebhookEndpoint) -> Result<(), AppError>;

    async fn list(&self, user_id: Uuid) -> Result<Vec<WebhookEndpoint>, AppError>;

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<WebhookEndpoint>, AppError>;

    async fn update(&self, endpoint: &WebhookEndpoint) -> Result<(), AppError>;

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError>;

    async fn record_delivery(&self, delivery: &WebhookDelivery) -> Result<(), AppError>;

    /// Newest first.
    async fn deliveries(&self, webhook_id: Uuid, limit: i64)
    -> Result<Vec<WebhookDelivery>, AppError>;
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn insert(&self, schedule: &Schedule) -> Result<(), AppError>;

    async fn list(&self, user_id: Uuid) -> Result<Vec<Schedule>, AppError>;

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Schedule>, AppError>;

    async fn update(&self, schedule: &Schedule) -> Result<(), AppError>;

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError>;

    /// Active schedules with `next_run_at <= now`, oldest first.
    async fn due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Schedule>, AppError>;

    async fn mark_ran(
        &self,
        id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn insert_execution(&self, execution: &ScheduleExecution) -> Result<(), AppError>;

    async fn complete_execution(
        &self,
        id: Uuid,
        status: ExecutionStatus,
        results: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Newest first.
    async fn executions(
        &self,
        schedule_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ScheduleExecution>, AppError>;
}

/// All stores the application uses, behind trait objects.
#[derive(Clone)]
pub struct Stores {
    pub credentials: Arc<dyn CredentialStore>,
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub cache: Arc<dyn CacheStore>,
    pub history: Arc<dyn HistoryStore>,
    pub usage: Arc<dyn UsageStore>,
    pub domains: Arc<dyn SavedDomainStore>,
    pub bulk_jobs: Arc<dyn BulkJobStore>,
    pub webhooks: Arc<dyn WebhookStore>,
    pub schedules: Arc<dyn ScheduleStore>,
}

impl Stores {
    pub fn postgres(pool: crate::db::DbPool) -> Self {
        Self::from_backend(Arc::new(postgres::PgStore::new(pool)))
    }

    pub fn in_memory() -> Self {
        Self::from_backend(Arc::new(memory::MemoryStore::default()))
    }

    fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: CredentialStore
            + RateLimitStore
            + CacheStore
            + HistoryStore
            + UsageStore
            + SavedDomainStore
            + BulkJobStore
            + WebhookStore
            + ScheduleStore
            + 'static,
    {
        Self {
            credentials: backend.clone(),
            rate_limits: backend.clone(),
            cache: backend.clone(),
            history: backend.clone(),
            usage: backend.clone(),
            domains: backend.clone(),
            bulk_jobs: backend.clone(),
            webhooks: backend.clone(),
            schedules: backend,
        }
    }
}
