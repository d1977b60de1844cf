#![allow(dead_code)]

use std::future::Future;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode},
};
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use domain_diagnostics_server::{
    clock::{Clock, ManualClock},
    config::Config,
    models::analysis::AnalysisKind,
    models::api_key::{IssuedApiKey, NewApiKey, PlanTier, User, UserStatus},
    providers::{AnalysisProvider, ProviderError, ProviderRegistry},
    router,
    services::auth_service,
    state::AppState,
    store::Stores,
};

/// Answers every lookup from memory and counts calls. Domains starting with
/// `fail.` produce a provider error.
pub struct StubProvider {
    kind: AnalysisKind,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl AnalysisProvider for StubProvider {
    fn kind(&self) -> AnalysisKind {
        self.kind
    }

    async fn fetch(&self, domain: &str) -> Result<Value, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if domain.starts_with("fail.") {
            return Err(ProviderError::Unavailable(format!("no answer for {domain}")));
        }

        Ok(match self.kind {
            AnalysisKind::Complete => json!({
                "domain": domain,
                "dns": { "records": { "A": ["192.0.2.1"], "MX": ["10 mail.example.com"] } },
                "ssl": { "is_valid": !domain.starts_with("expired."), "days_until_expiry": 30 },
                "blacklist": { "is_blacklisted": false },
            }),
            kind => json!({ "domain": domain, "kind": kind.as_str() }),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub clock: ManualClock,
    pub calls: Arc<AtomicUsize>,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 10, 15, 0).unwrap()
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(mut config: Config) -> Self {
        config.api_key_pepper = "test-pepper".to_string();

        let calls = Arc::new(AtomicUsize::new(0));
        let providers = AnalysisKind::ALL
            .into_iter()
            .fold(ProviderRegistry::new(), |registry, kind| {
                registry.with(Arc::new(StubProvider {
                    kind,
                    calls: calls.clone(),
                }))
            });

        let clock = ManualClock::new(start_time());
        let state = AppState::with_clock(
            config,
            Stores::in_memory(),
            providers,
            Arc::new(clock.clone()),
        );

        Self {
            router: router(state.clone()),
            state,
            clock,
            calls,
        }
    }

    pub fn provider_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn user(&self, status: UserStatus) -> User {
        self.state
            .stores
            .credentials
            .create_user(
                &format!("{}@example.com", Uuid::new_v4()),
                PlanTier::Free,
                status,
                self.clock.now(),
            )
            .await
            .unwrap()
    }

    pub async fn key_for(
        &self,
        user: &User,
        rate_limit_per_hour: Option<i32>,
        expires_at: Option<DateTime<Utc>>,
    ) -> String {
        self.issue_key(user, rate_limit_per_hour, expires_at)
            .await
            .secret
    }

    pub async fn issue_key(
        &self,
        user: &User,
        rate_limit_per_hour: Option<i32>,
        expires_at: Option<DateTime<Utc>>,
    ) -> IssuedApiKey {
        auth_service::issue_api_key(
            &self.state,
            NewApiKey {
                user_id: user.id,
                name: "test".to_string(),
                plan: user.plan,
                rate_limit_per_hour,
                expires_at,
            },
        )
        .await
        .unwrap()
    }

    /// An active user with a default free-plan key.
    pub async fn active_key(&self) -> (User, String) {
        let user = self.user(UserStatus::Active).await;
        let key = self.key_for(&user, None, None).await;
        (user, key)
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, body)
    }
}

pub fn get(uri: &str, key: Option<&str>) -> Request<Body> {
    request("GET", uri, key, Body::empty())
}

pub fn delete(uri: &str, key: &str) -> Request<Body> {
    request("DELETE", uri, Some(key), Body::empty())
}

pub fn json(method: &str, uri: &str, key: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .header("X-API-Key", key)
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn request(method: &str, uri: &str, key: Option<&str>, body: Body) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        builder = builder.header("X-API-Key", key);
    }
    builder.body(body).unwrap()
}

/// Poll `check` until it holds; detached writes land a few ticks later.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
