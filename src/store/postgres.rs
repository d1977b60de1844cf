//! PostgreSQL store.
//!
//! Rows are read into private `FromRow` structs and converted into the
//! domain models, parsing the TEXT status/plan/kind columns on the way.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    BulkJobStore, CacheStore, CredentialStore, HistoryStore, RateLimitStore, SavedDomainStore,
    ScheduleStore, UsageStore, WebhookStore,
};
use crate::db::DbPool;
use crate::error::AppError;
use crate::models::{
    analysis::{HistoryQuery, HistoryRecord, NewHistoryRecord, NewUsageRecord, UsageSummary},
    api_key::{ApiKey, KeyStatus, PlanTier, User, UserStatus},
    bulk_job::{BulkJob, JobStatus},
    saved_domain::SavedDomain,
    schedule::{ExecutionStatus, Schedule, ScheduleExecution},
    webhook::{WebhookDelivery, WebhookEndpoint, WebhookEvent},
};

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse<T: FromStr<Err = String>>(value: &str) -> Result<T, AppError> {
    value.parse::<T>().map_err(AppError::Internal)
}

/// Postgres unique_violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[derive(sqlx::FromRow)]
struct KeyWithUserRow {
    id: Uuid,
    key_hash: String,
    user_id: Uuid,
    name: String,
    plan: String,
    status: String,
    rate_limit_per_hour: i32,
    expires_at: Option<DateTime<Utc>>,
    last_used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    user_email: String,
    user_plan: String,
    user_status: String,
    user_created_at: DateTime<Utc>,
}

impl TryFrom<KeyWithUserRow> for (ApiKey, User) {
    type Error = AppError;

    fn try_from(row: KeyWithUserRow) -> Result<Self, Self::Error> {
        let key = ApiKey {
            id: row.id,
            key_hash: row.key_hash,
            user_id: row.user_id,
            name: row.name,
            plan: parse(&row.plan)?,
            status: parse(&row.status)?,
            rate_limit_per_hour: row.rate_limit_per_hour,
            expires_at: row.expires_at,
            last_used_at: row.last_used_at,
            created_at: row.created_at,
        };
        let user = User {
            id: row.user_id,
            email: row.user_email,
            plan: parse(&row.user_plan)?,
            status: parse(&row.user_status)?,
            created_at: row.user_created_at,
        };
        Ok((key, user))
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_key_by_hash(&self, key_hash: &str) -> Result<Option<(ApiKey, User)>, AppError> {
        let row = sqlx::query_as::<_, KeyWithUserRow>(
            r#"
            SELECT k.id, k.key_hash, k.user_id, k.name, k.plan, k.status,
                   k.rate_limit_per_hour, k.expires_at, k.last_used_at, k.created_at,
                   u.email AS user_email, u.plan AS user_plan,
                   u.status AS user_status, u.created_at AS user_created_at
            FROM api_keys k
            JOIN users u ON u.id = k.user_id
            WHERE k.key_hash = $1
            "#,
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn touch_last_used(&self, key_id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE api_keys SET last_used_at = $1 WHERE id = $2")
            .bind(at)
            .bind(key_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_user(
        &self,
        email: &str,
        plan: PlanTier,
        status: UserStatus,
        at: DateTime<Utc>,
    ) -> Result<User, AppError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO users (id, email, plan, status, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(email)
        .bind(plan.as_str())
        .bind(status.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("User {email} already exists"))
            } else {
                e.into()
            }
        })?;

        Ok(User {
            id,
            email: email.to_string(),
            plan,
            status,
            created_at: at,
        })
    }

    async fn insert_api_key(&self, key: &ApiKey) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO api_keys (
                id, key_hash, user_id, name, plan, status,
                rate_limit_per_hour, expires_at, last_used_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(key.id)
        .bind(&key.key_hash)
        .bind(key.user_id)
        .bind(&key.name)
        .bind(key.plan.as_str())
        .bind(key.status.as_str())
        .bind(key.rate_limit_per_hour)
        .bind(key.expires_at)
        .bind(key.last_used_at)
        .bind(key.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_key_status(&self, key_id: Uuid, status: KeyStatus) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE api_keys SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(key_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_user_status(&self, user_id: Uuid, status: UserStatus) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE users SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl RateLimitStore for PgStore {
    async fn increment_window(
        &self,
        key_id: Uuid,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        ceiling: i32,
    ) -> Result<Option<i32>, AppError> {
        // The conflicting row is locked for the duration of the upsert, so the
        // comparison and the increment cannot interleave with another request.
        // When the WHERE clause fails no row is returned and the request is refused.
        let count = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO rate_windows (api_key_id, window_start, window_end, request_count)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (api_key_id, window_start)
            DO UPDATE SET request_count = rate_windows.request_count + 1
            WHERE rate_windows.request_count < $4
            RETURNING request_count
            "#,
        )
        .bind(key_id)
        .bind(window_start)
        .bind(window_end)
        .bind(ceiling)
        .fetch_optional(&self.pool)
        .await?;

        Ok(count)
    }

    async fn prune_windows(&self, before: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM rate_windows WHERE window_end < $1")
            .bind(before)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CacheStore for PgStore {
    async fn get(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<serde_json::Value>, AppError> {
        let payload = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT payload FROM result_cache WHERE cache_key = $1 AND expires_at > $2",
        )
        .bind(key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payload)
    }

    async fn set(
        &self,
        key: &str,
        payload: &serde_json::Value,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO result_cache (cache_key, payload, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (cache_key)
            DO UPDATE SET payload = EXCLUDED.payload, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(payload)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn prune(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM result_cache WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: Uuid,
    user_id: Uuid,
    api_key_id: Uuid,
    domain: String,
    analysis_type: String,
    result: serde_json::Value,
    from_cache: bool,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<HistoryRow> for HistoryRecord {
    fn from(row: HistoryRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            api_key_id: row.api_key_id,
            domain: row.domain,
            analysis_type: row.analysis_type,
            result: row.result,
            from_cache: row.from_cache,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl HistoryStore for PgStore {
    async fn append(&self, record: NewHistoryRecord, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO analysis_history (
                id, user_id, api_key_id, domain, analysis_type,
                result, from_cache, ip_address, user_agent, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(record.user_id)
        .bind(record.api_key_id)
        .bind(record.domain)
        .bind(record.analysis_type)
        .bind(record.result)
        .bind(record.from_cache)
        .bind(record.ip_address)
        .bind(record.user_agent)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, query: &HistoryQuery) -> Result<(Vec<HistoryRecord>, i64), AppError> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, user_id, api_key_id, domain, analysis_type,
                   result, from_cache, ip_address, user_agent, created_at
            FROM analysis_history
            WHERE user_id = $1 AND ($2::TEXT IS NULL OR domain = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(query.user_id)
        .bind(query.domain.as_deref())
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM analysis_history
            WHERE user_id = $1 AND ($2::TEXT IS NULL OR domain = $2)
            "#,
        )
        .bind(query.user_id)
        .bind(query.domain.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }
}

#[async_trait]
impl UsageStore for PgStore {
    async fn record(&self, record: NewUsageRecord, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO api_usage (
                api_key_id, user_id, endpoint, method, status_code,
                from_cache, execution_time_ms, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.api_key_id)
        .bind(record.user_id)
        .bind(record.endpoint)
        .bind(record.method)
        .bind(record.status_code)
        .bind(record.from_cache)
        .bind(record.execution_time_ms)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn summary(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<UsageSummary, AppError> {
        let (total_requests, cached_requests, avg_execution_time) =
            sqlx::query_as::<_, (i64, i64, f64)>(
                r#"
                SELECT COUNT(*)::BIGINT,
                       COUNT(*) FILTER (WHERE from_cache)::BIGINT,
                       COALESCE(AVG(execution_time_ms), 0)::FLOAT8
                FROM api_usage
                WHERE user_id = $1 AND created_at >= $2
                "#,
            )
            .bind(user_id)
            .bind(since)
            .fetch_one(&self.pool)
            .await?;

        Ok(UsageSummary {
            total_requests,
            cached_requests,
            avg_execution_time,
            period_days: 0,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SavedDomainRow {
    id: Uuid,
    user_id: Uuid,
    domain: String,
    label: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<SavedDomainRow> for SavedDomain {
    fn from(row: SavedDomainRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            domain: row.domain,
            label: row.label,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl SavedDomainStore for PgStore {
    async fn list(&self, user_id: Uuid) -> Result<Vec<SavedDomain>, AppError> {
        let rows = sqlx::query_as::<_, SavedDomainRow>(
            r#"
            SELECT id, user_id, domain, label, created_at
            FROM saved_domains
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert(
        &self,
        user_id: Uuid,
        domain: &str,
        label: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<SavedDomain, AppError> {
        let row = sqlx::query_as::<_, SavedDomainRow>(
            r#"
            INSERT INTO saved_domains (id, user_id, domain, label, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, domain, label, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(domain)
        .bind(label)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("{domain} is already saved"))
            } else {
                e.into()
            }
        })?;
        Ok(row.into())
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        // Filtering by owner means another user's row looks exactly like a missing one
        let result = sqlx::query("DELETE FROM saved_domains WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(sqlx::FromRow)]
struct BulkJobRow {
    id: Uuid,
    user_id: Uuid,
    scan_type: String,
    domains: Vec<String>,
    status: String,
    processed: i32,
    failed: i32,
    results: serde_json::Value,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<BulkJobRow> for BulkJob {
    type Error = AppError;

    fn try_from(row: BulkJobRow) -> Result<Self, Self::Error> {
        let results = match row.results {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            scan_type: parse(&row.scan_type)?,
            domains: row.domains,
            status: parse(&row.status)?,
            processed: row.processed,
            failed: row.failed,
            results,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

#[async_trait]
impl BulkJobStore for PgStore {
    async fn insert(&self, job: &BulkJob) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO bulk_jobs (
                id, user_id, scan_type, domains, status,
                processed, failed, results, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(job.id)
        .bind(job.user_id)
        .bind(job.scan_type.as_str())
        .bind(&job.domains)
        .bind(job.status.as_str())
        .bind(job.processed)
        .bind(job.failed)
        .bind(serde_json::Value::Object(job.results.clone()))
        .bind(job.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<BulkJob>, AppError> {
        let row = sqlx::query_as::<_, BulkJobRow>(
            r#"
            SELECT id, user_id, scan_type, domains, status, processed, failed,
                   results, created_at, started_at, completed_at
            FROM bulk_jobs
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn status(&self, id: Uuid) -> Result<Option<JobStatus>, AppError> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM bulk_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        status.as_deref().map(parse).transpose()
    }

    async fn mark_running(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE bulk_jobs SET status = 'running', started_at = $2 WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_result(
        &self,
        id: Uuid,
        domain: &str,
        result: serde_json::Value,
        failed: bool,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE bulk_jobs
            SET results = results || jsonb_build_object($2::TEXT, $3::JSONB),
                processed = processed + 1,
                failed = failed + $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(domain)
        .bind(result)
        .bind(i32::from(failed))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finish(
        &self,
        id: Uuid,
        status: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE bulk_jobs SET status = $2, completed_at = $3 WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn cancel(&self, user_id: Uuid, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE bulk_jobs SET status = 'cancelled', completed_at = $3
            WHERE id = $1 AND user_id = $2 AND status IN ('pending', 'running')
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(sqlx::FromRow)]
struct WebhookRow {
    id: Uuid,
    user_id: Uuid,
    url: String,
    events: Vec<String>,
    secret: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WebhookRow> for WebhookEndpoint {
    type Error = AppError;

    fn try_from(row: WebhookRow) -> Result<Self, Self::Error> {
        let events = row
            .events
            .iter()
            .map(|e| parse::<WebhookEvent>(e))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            url: row.url,
            events,
            secret: row.secret,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    id: Uuid,
    webhook_id: Uuid,
    event: String,
    payload: serde_json::Value,
    response_status: Option<i32>,
    response_body: Option<String>,
    success: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<DeliveryRow> for WebhookDelivery {
    type Error = AppError;

    fn try_from(row: DeliveryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            webhook_id: row.webhook_id,
            event: parse(&row.event)?,
            payload: row.payload,
            response_status: row.response_status,
            response_body: row.response_body,
            success: row.success,
            created_at: row.created_at,
        })
    }
}

fn event_names(events: &[WebhookEvent]) -> Vec<String> {
    events.iter().map(|e| e.as_str().to_string()).collect()
}

#[async_trait]
impl WebhookStore for PgStore {
    async fn insert(&self, endpoint: &WebhookEndpoint) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO webhook_endpoints (
                id, user_id, url, events, secret, is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(endpoint.id)
        .bind(endpoint.user_id)
        .bind(&endpoint.url)
        .bind(event_names(&endpoint.events))
        .bind(&endpoint.secret)
        .bind(endpoint.is_active)
        .bind(endpoint.created_at)
        .bind(endpoint.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<WebhookEndpoint>, AppError> {
        let rows = sqlx::query_as::<_, WebhookRow>(
            r#"
            SELECT id, user_id, url, events, secret, is_active, created_at, updated_at
            FROM webhook_endpoints
            WHERE user_id = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<WebhookEndpoint>, AppError> {
        let row = sqlx::query_as::<_, WebhookRow>(
            r#"
            SELECT id, user_id, url, events, secret, is_active, created_at, updated_at
            FROM webhook_endpoints
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, endpoint: &WebhookEndpoint) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE webhook_endpoints
            SET url = $3, events = $4, is_active = $5, updated_at = $6
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(endpoint.id)
        .bind(endpoint.user_id)
        .bind(&endpoint.url)
        .bind(event_names(&endpoint.events))
        .bind(endpoint.is_active)
        .bind(endpoint.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        // Soft delete keeps the delivery log intact
        let result = sqlx::query(
            r#"
            UPDATE webhook_endpoints SET is_active = false, deleted_at = NOW()
            WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_delivery(&self, delivery: &WebhookDelivery) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO webhook_deliveries (
                id, webhook_id, event, payload, response_status,
                response_body, success, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(delivery.id)
        .bind(delivery.webhook_id)
        .bind(delivery.event.as_str())
        .bind(&delivery.payload)
        .bind(delivery.response_status)
        .bind(&delivery.response_body)
        .bind(delivery.success)
        .bind(delivery.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn deliveries(
        &self,
        webhook_id: Uuid,
        limit: i64,
    ) -> Result<Vec<WebhookDelivery>, AppError> {
        let rows = sqlx::query_as::<_, DeliveryRow>(
            r#"
            SELECT id, webhook_id, event, payload, response_status,
                   response_body, success, created_at
            FROM webhook_deliveries
            WHERE webhook_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(webhook_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    domains: Vec<String>,
    frequency: String,
    scan_type: String,
    options: serde_json::Value,
    is_active: bool,
    next_run_at: DateTime<Utc>,
    last_run_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ScheduleRow> for Schedule {
    type Error = AppError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            domains: row.domains,
            frequency: parse(&row.frequency)?,
            scan_type: parse(&row.scan_type)?,
            options: row.options,
            is_active: row.is_active,
            next_run_at: row.next_run_at,
            last_run_at: row.last_run_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: Uuid,
    schedule_id: Uuid,
    status: String,
    results: serde_json::Value,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ExecutionRow> for ScheduleExecution {
    type Error = AppError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            schedule_id: row.schedule_id,
            status: parse(&row.status)?,
            results: row.results,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

const SCHEDULE_COLUMNS: &str = "id, user_id, name, domains, frequency, scan_type, options, \
                                is_active, next_run_at, last_run_at, created_at, updated_at";

#[async_trait]
impl ScheduleStore for PgStore {
    async fn insert(&self, schedule: &Schedule) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO schedules (
                id, user_id, name, domains, frequency, scan_type, options,
                is_active, next_run_at, last_run_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(schedule.id)
        .bind(schedule.user_id)
        .bind(&schedule.name)
        .bind(&schedule.domains)
        .bind(schedule.frequency.as_str())
        .bind(schedule.scan_type.as_str())
        .bind(&schedule.options)
        .bind(schedule.is_active)
        .bind(schedule.next_run_at)
        .bind(schedule.last_run_at)
        .bind(schedule.created_at)
        .bind(schedule.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<Schedule>, AppError> {
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE user_id = $1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, ScheduleRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Schedule>, AppError> {
        let sql = format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = $1 AND user_id = $2");
        let row = sqlx::query_as::<_, ScheduleRow>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, schedule: &Schedule) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE schedules
            SET name = $3, domains = $4, frequency = $5, scan_type = $6, options = $7,
                is_active = $8, next_run_at = $9, updated_at = $10
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(schedule.id)
        .bind(schedule.user_id)
        .bind(&schedule.name)
        .bind(&schedule.domains)
        .bind(schedule.frequency.as_str())
        .bind(schedule.scan_type.as_str())
        .bind(&schedule.options)
        .bind(schedule.is_active)
        .bind(schedule.next_run_at)
        .bind(schedule.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM schedules WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Schedule>, AppError> {
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules \
             WHERE is_active AND next_run_at <= $1 \
             ORDER BY next_run_at ASC LIMIT $2"
        );
        let rows = sqlx::query_as::<_, ScheduleRow>(&sql)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn mark_ran(
        &self,
        id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE schedules SET last_run_at = $2, next_run_at = $3 WHERE id = $1")
            .bind(id)
            .bind(last_run_at)
            .bind(next_run_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_execution(&self, execution: &ScheduleExecution) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO schedule_executions (id, schedule_id, status, results, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(execution.id)
        .bind(execution.schedule_id)
        .bind(execution.status.as_str())
        .bind(&execution.results)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_execution(
        &self,
        id: Uuid,
        status: ExecutionStatus,
        results: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE schedule_executions SET status = $2, results = $3, completed_at = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(results)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn executions(
        &self,
        schedule_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ScheduleExecution>, AppError> {
        let rows = sqlx::query_as::<_, ExecutionRow>(
            r#"
            SELECT id, schedule_id, status, results, started_at, completed_at
            FROM schedule_executions
            WHERE schedule_id = $1
            ORDER BY started_at DESC
            LIMIT $2
            "#,
        )
        .bind(schedule_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}
