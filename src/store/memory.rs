//! In-memory store.
//!
//! Every table is a `HashMap` behind its own mutex. No lock is held across an
//! `.await`, and each trait method does its read-modify-write inside a single
//! critical section, which is what makes `increment_window` atomic.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    BulkJobStore, CacheStore, CredentialStore, HistoryStore, RateLimitStore, SavedDomainStore,
    ScheduleStore, UsageStore, WebhookStore,
};
use crate::error::AppError;
use crate::models::{
    analysis::{HistoryQuery, HistoryRecord, NewHistoryRecord, NewUsageRecord, UsageSummary},
    api_key::{ApiKey, KeyStatus, PlanTier, User, UserStatus},
    bulk_job::{BulkJob, JobStatus},
    saved_domain::SavedDomain,
    schedule::{ExecutionStatus, Schedule, ScheduleExecution},
    webhook::{WebhookDelivery, WebhookEndpoint},
};

#[derive(Debug, Clone)]
struct RateWindow {
    request_count: i32,
    window_end: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: serde_json::Value,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct UsageRow {
    user_id: Uuid,
    from_cache: bool,
    execution_time_ms: i64,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<Uuid, User>>,
    api_keys: Mutex<HashMap<Uuid, ApiKey>>,
    rate_windows: Mutex<HashMap<(Uuid, DateTime<Utc>), RateWindow>>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    history: Mutex<Vec<HistoryRecord>>,
    usage: Mutex<Vec<UsageRow>>,
    saved_domains: Mutex<Vec<SavedDomain>>,
    bulk_jobs: Mutex<HashMap<Uuid, BulkJob>>,
    webhooks: Mutex<HashMap<Uuid, WebhookEndpoint>>,
    deliveries: Mutex<Vec<WebhookDelivery>>,
    schedules: Mutex<HashMap<Uuid, Schedule>>,
    executions: Mutex<Vec<ScheduleExecution>>,
}

/// Poisoning only happens if a holder panicked; the maps stay structurally valid.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_key_by_hash(&self, key_hash: &str) -> Result<Option<(ApiKey, User)>, AppError> {
        let key = lock(&self.api_keys)
            .values()
            .find(|k| k.key_hash == key_hash)
            .cloned();

        let Some(key) = key else {
            return Ok(None);
        };

        let user = lock(&self.users).get(&key.user_id).cloned();
        Ok(user.map(|user| (key, user)))
    }

    async fn touch_last_used(&self, key_id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(key) = lock(&self.api_keys).get_mut(&key_id) {
            key.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn create_user(
        &self,
        email: &str,
        plan: PlanTier,
        status: UserStatus,
        at: DateTime<Utc>,
    ) -> Result<User, AppError> {
        let mut users = lock(&self.users);
        if users.values().any(|u| u.email == email) {
            return Err(AppError::Conflict(format!("User {email} already exists")));
        }

        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            plan,
            status,
            created_at: at,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn insert_api_key(&self, key: &ApiKey) -> Result<(), AppError> {
        let mut keys = lock(&self.api_keys);
        if keys.values().any(|k| k.key_hash == key.key_hash) {
            return Err(AppError::Conflict("API key already exists".to_string()));
        }
        keys.insert(key.id, key.clone());
        Ok(())
    }

    async fn set_key_status(&self, key_id: Uuid, status: KeyStatus) -> Result<bool, AppError> {
        Ok(lock(&self.api_keys)
            .get_mut(&key_id)
            .map(|key| key.status = status)
            .is_some())
    }

    async fn set_user_status(&self, user_id: Uuid, status: UserStatus) -> Result<bool, AppError> {
        Ok(lock(&self.users)
            .get_mut(&user_id)
            .map(|user| user.status = status)
            .is_some())
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn increment_window(
        &self,
        key_id: Uuid,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        ceiling: i32,
    ) -> Result<Option<i32>, AppError> {
        let mut windows = lock(&self.rate_windows);
        let window = windows
            .entry((key_id, window_start))
            .or_insert(RateWindow {
                request_count: 0,
                window_end,
            });

        if window.request_count >= ceiling {
            return Ok(None);
        }

        window.request_count += 1;
        Ok(Some(window.request_count))
    }

    async fn prune_windows(&self, before: DateTime<Utc>) -> Result<u64, AppError> {
        let mut windows = lock(&self.rate_windows);
        let len = windows.len();
        windows.retain(|_, w| w.window_end >= before);
        Ok((len - windows.len()) as u64)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<serde_json::Value>, AppError> {
        Ok(lock(&self.cache)
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.payload.clone()))
    }

    async fn set(
        &self,
        key: &str,
        payload: &serde_json::Value,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        lock(&self.cache).insert(
            key.to_string(),
            CacheEntry {
                payload: payload.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn prune(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut cache = lock(&self.cache);
        let len = cache.len();
        cache.retain(|_, entry| entry.expires_at > now);
        Ok((len - cache.len()) as u64)
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn append(&self, record: NewHistoryRecord, at: DateTime<Utc>) -> Result<(), AppError> {
        lock(&self.history).push(HistoryRecord {
            id: Uuid::new_v4(),
            user_id: record.user_id,
            api_key_id: record.api_key_id,
            domain: record.domain,
            analysis_type: record.analysis_type,
            result: record.result,
            from_cache: record.from_cache,
            ip_address: record.ip_address,
            user_agent: record.user_agent,
            created_at: at,
        });
        Ok(())
    }

    async fn list(&self, query: &HistoryQuery) -> Result<(Vec<HistoryRecord>, i64), AppError> {
        let history = lock(&self.history);
        let mut matching: Vec<&HistoryRecord> = history
            .iter()
            .filter(|r| r.user_id == query.user_id)
            .filter(|r| query.domain.as_ref().is_none_or(|d| &r.domain == d))
            .collect();

        // Stable sort keeps insertion order for records sharing a timestamp
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as i64;

        let page = matching
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .cloned()
            .collect();

        Ok((page, total))
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn record(&self, record: NewUsageRecord, at: DateTime<Utc>) -> Result<(), AppError> {
        lock(&self.usage).push(UsageRow {
            user_id: record.user_id,
            from_cache: record.from_cache,
            execution_time_ms: record.execution_time_ms,
            created_at: at,
        });
        Ok(())
    }

    async fn summary(&self, user_id: Uuid, since: DateTime<Utc>) -> Result<UsageSummary, AppError> {
        let usage = lock(&self.usage);
        let rows: Vec<&UsageRow> = usage
            .iter()
            .filter(|r| r.user_id == user_id && r.created_at >= since)
            .collect();

        let total_requests = rows.len() as i64;
        let cached_requests = rows.iter().filter(|r| r.from_cache).count() as i64;
        let avg_execution_time = if rows.is_empty() {
            0.0
        } else {
            rows.iter().map(|r| r.execution_time_ms as f64).sum::<f64>() / rows.len() as f64
        };

        Ok(UsageSummary {
            total_requests,
            cached_requests,
            avg_execution_time,
            period_days: 0,
        })
    }
}

#[async_trait]
impl SavedDomainStore for MemoryStore {
    async fn list(&self, user_id: Uuid) -> Result<Vec<SavedDomain>, AppError> {
        let mut domains: Vec<SavedDomain> = lock(&self.saved_domains)
            .iter()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        domains.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(domains)
    }

    async fn insert(
        &self,
        user_id: Uuid,
        domain: &str,
        label: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<SavedDomain, AppError> {
        let mut domains = lock(&self.saved_domains);
        if domains
            .iter()
            .any(|d| d.user_id == user_id && d.domain == domain)
        {
            return Err(AppError::Conflict(format!("{domain} is already saved")));
        }

        let saved = SavedDomain {
            id: Uuid::new_v4(),
            user_id,
            domain: domain.to_string(),
            label,
            created_at: at,
        };
        domains.push(saved.clone());
        Ok(saved)
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let mut domains = lock(&self.saved_domains);
        let len = domains.len();
        domains.retain(|d| !(d.id == id && d.user_id == user_id));
        Ok(domains.len() != len)
    }
}

#[async_trait]
impl BulkJobStore for MemoryStore {
    async fn insert(&self, job: &BulkJob) -> Result<(), AppError> {
        lock(&self.bulk_jobs).insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<BulkJob>, AppError> {
        Ok(lock(&self.bulk_jobs)
            .get(&id)
            .filter(|job| job.user_id == user_id)
            .cloned())
    }

    async fn status(&self, id: Uuid) -> Result<Option<JobStatus>, AppError> {
        Ok(lock(&self.bulk_jobs).get(&id).map(|job| job.status))
    }

    async fn mark_running(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError> {
        let mut jobs = lock(&self.bulk_jobs);
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.status = JobStatus::Running;
                job.started_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_result(
        &self,
        id: Uuid,
        domain: &str,
        result: serde_json::Value,
        failed: bool,
    ) -> Result<(), AppError> {
        if let Some(job) = lock(&self.bulk_jobs).get_mut(&id) {
            job.results.insert(domain.to_string(), result);
            job.processed += 1;
            if failed {
                job.failed += 1;
            }
        }
        Ok(())
    }

    async fn finish(
        &self,
        id: Uuid,
        status: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut jobs = lock(&self.bulk_jobs);
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Running => {
                job.status = status;
                job.completed_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cancel(&self, user_id: Uuid, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError> {
        let mut jobs = lock(&self.bulk_jobs);
        match jobs.get_mut(&id) {
            Some(job) if job.user_id == user_id && !job.status.is_finished() => {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl WebhookStore for MemoryStore {
    async fn insert(&self, endpoint: &WebhookEndpoint) -> Result<(), AppError> {
        lock(&self.webhooks).insert(endpoint.id, endpoint.clone());
        Ok(())
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<WebhookEndpoint>, AppError> {
        let mut endpoints: Vec<WebhookEndpoint> = lock(&self.webhooks)
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        endpoints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(endpoints)
    }

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<WebhookEndpoint>, AppError> {
        Ok(lock(&self.webhooks)
            .get(&id)
            .filter(|e| e.user_id == user_id)
            .cloned())
    }

    async fn update(&self, endpoint: &WebhookEndpoint) -> Result<(), AppError> {
        lock(&self.webhooks).insert(endpoint.id, endpoint.clone());
        Ok(())
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let mut webhooks = lock(&self.webhooks);
        if webhooks.get(&id).is_some_and(|e| e.user_id == user_id) {
            webhooks.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn record_delivery(&self, delivery: &WebhookDelivery) -> Result<(), AppError> {
        lock(&self.deliveries).push(delivery.clone());
        Ok(())
    }

    async fn deliveries(
        &self,
        webhook_id: Uuid,
        limit: i64,
    ) -> Result<Vec<WebhookDelivery>, AppError> {
        Ok(lock(&self.deliveries)
            .iter()
            .rev()
            .filter(|d| d.webhook_id == webhook_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn insert(&self, schedule: &Schedule) -> Result<(), AppError> {
        lock(&self.schedules).insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<Schedule>, AppError> {
        let mut schedules: Vec<Schedule> = lock(&self.schedules)
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        schedules.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(schedules)
    }

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Schedule>, AppError> {
        Ok(lock(&self.schedules)
            .get(&id)
            .filter(|s| s.user_id == user_id)
            .cloned())
    }

    async fn update(&self, schedule: &Schedule) -> Result<(), AppError> {
        lock(&self.schedules).insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let mut schedules = lock(&self.schedules);
        if schedules.get(&id).is_some_and(|s| s.user_id == user_id) {
            schedules.remove(&id);
            lock(&self.executions).retain(|e| e.schedule_id != id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Schedule>, AppError> {
        let mut due: Vec<Schedule> = lock(&self.schedules)
            .values()
            .filter(|s| s.is_active && s.next_run_at <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.next_run_at.cmp(&b.next_run_at));
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn mark_ran(
        &self,
        id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if let Some(schedule) = lock(&self.schedules).get_mut(&id) {
            schedule.last_run_at = Some(last_run_at);
            schedule.next_run_at = next_run_at;
        }
        Ok(())
    }

    async fn insert_execution(&self, execution: &ScheduleExecution) -> Result<(), AppError> {
        lock(&self.executions).push(execution.clone());
        Ok(())
    }

    async fn complete_execution(
        &self,
        id: Uuid,
        status: ExecutionStatus,
        results: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if let Some(execution) = lock(&self.executions).iter_mut().find(|e| e.id == id) {
            execution.status = status;
            execution.results = results;
            execution.completed_at = Some(at);
        }
        Ok(())
    }

    async fn executions(
        &self,
        schedule_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ScheduleExecution>, AppError> {
        Ok(lock(&self.executions)
            .iter()
            .rev()
            .filter(|e| e.schedule_id == schedule_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn window_refuses_at_ceiling() {
        let store = MemoryStore::default();
        let key = Uuid::new_v4();

        for expected in 1..=3 {
            let count = store
                .increment_window(key, hour(10), hour(11), 3)
                .await
                .unwrap();
            assert_eq!(count, Some(expected));
        }

        let refused = store
            .increment_window(key, hour(10), hour(11), 3)
            .await
            .unwrap();
        assert_eq!(refused, None);

        let next_hour = store
            .increment_window(key, hour(11), hour(12), 3)
            .await
            .unwrap();
        assert_eq!(next_hour, Some(1));
    }

    #[tokio::test]
    async fn concurrent_increments_never_exceed_ceiling() {
        let store = Arc::new(MemoryStore::default());
        let key = Uuid::new_v4();

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .increment_window(key, hour(10), hour(11), 20)
                        .await
                        .unwrap()
                        .is_some()
                })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 20);
    }

    #[tokio::test]
    async fn cache_entry_expires_at_its_deadline() {
        let store = MemoryStore::default();
        let payload = serde_json::json!({ "a": 1 });
        let written = hour(10);
        let expires = written + Duration::seconds(60);

        CacheStore::set(&store, "k", &payload, expires).await.unwrap();

        let fresh = CacheStore::get(&store, "k", expires - Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(fresh, Some(payload));

        let stale = CacheStore::get(&store, "k", expires).await.unwrap();
        assert_eq!(stale, None);

        assert_eq!(CacheStore::prune(&store, expires).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn history_pages_newest_first() {
        let store = MemoryStore::default();
        let user = Uuid::new_v4();

        for i in 0..5u32 {
            store
                .append(
                    NewHistoryRecord {
                        user_id: user,
                        api_key_id: Uuid::new_v4(),
                        domain: format!("d{i}.com"),
                        analysis_type: "dns".into(),
                        result: serde_json::Value::Null,
                        from_cache: false,
                        ip_address: None,
                        user_agent: None,
                    },
                    hour(i),
                )
                .await
                .unwrap();
        }

        let (page, total) = HistoryStore::list(
            &store,
            &HistoryQuery {
                user_id: user,
                domain: None,
                limit: 2,
                offset: 1,
            },
        )
        .await
        .unwrap();

        assert_eq!(total, 5);
        let domains: Vec<_> = page.iter().map(|r| r.domain.as_str()).collect();
        assert_eq!(domains, vec!["d3.com", "d2.com"]);
    }
}
