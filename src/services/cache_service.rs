//! Result cache wrapper.
//!
//! The cache is an optimization: a failing cache store turns reads into
//! misses and writes into no-ops, it never fails a lookup.

use chrono::TimeDelta;

use crate::models::analysis::AnalysisKind;
use crate::state::AppState;

const CACHE_SCOPE: &str = "api_v2";

/// `api_v2:<kind>:<domain>`. The domain must already be normalized.
pub fn cache_key(kind: AnalysisKind, domain: &str) -> String {
    format!("{CACHE_SCOPE}:{kind}:{domain}")
}

pub async fn get(state: &AppState, key: &str) -> Option<serde_json::Value> {
    match state.stores.cache.get(key, state.now()).await {
        Ok(hit) => hit,
        Err(e) => {
            tracing::warn!(key, error = %e, "Cache read failed, treating as miss");
            None
        }
    }
}

pub async fn put(state: &AppState, key: &str, payload: &serde_json::Value, ttl_secs: i64) {
    let expires_at = state.now() + TimeDelta::seconds(ttl_secs);
    if let Err(e) = state.stores.cache.set(key, payload, expires_at).await {
        tracing::warn!(key, error = %e, "Cache write failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_scoped_by_kind() {
        assert_eq!(cache_key(AnalysisKind::Dns, "example.com"), "api_v2:dns:example.com");
        assert_ne!(
            cache_key(AnalysisKind::Dns, "example.com"),
            cache_key(AnalysisKind::Whois, "example.com")
        );
    }
}
