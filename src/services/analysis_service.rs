//! Cache-or-fetch lookups and the synchronous bulk endpoint.

use std::time::Instant;

use futures::{StreamExt, stream};
use serde_json::{Map, Value};

use crate::domain_name;
use crate::error::AppError;
use crate::middleware::auth::RequestContext;
use crate::models::analysis::AnalysisKind;
use crate::services::{cache_service, history_service};
use crate::state::AppState;

/// Largest domain list `/api/v2/bulk` accepts.
pub const MAX_BULK_DOMAINS: usize = 50;
/// Lookups in flight at once for one bulk request.
pub const BULK_CONCURRENCY: usize = 8;

#[derive(Debug, Clone)]
pub struct Analysis {
    pub data: Value,
    pub from_cache: bool,
}

/// Serve `kind` for an already-normalized domain from the cache, or call the
/// provider and cache what it returns.
///
/// The provider call is bounded by `PROVIDER_TIMEOUT_SECS`. Failures are not
/// cached.
pub async fn cached_lookup(
    state: &AppState,
    kind: AnalysisKind,
    domain: &str,
) -> Result<Analysis, AppError> {
    let key = cache_service::cache_key(kind, domain);

    if let Some(data) = cache_service::get(state, &key).await {
        tracing::debug!(%kind, domain, "Cache hit");
        return Ok(Analysis {
            data,
            from_cache: true,
        });
    }

    let provider = state.providers.get(kind)?;
    let deadline = state.config.provider_timeout();
    let started = Instant::now();

    let mut data = match tokio::time::timeout(deadline, provider.fetch(domain)).await {
        Ok(Ok(data)) => data,
        Ok(Err(e)) => {
            tracing::warn!(%kind, domain, error = %e, "Lookup failed");
            return Err(e.into());
        }
        Err(_) => {
            tracing::warn!(%kind, domain, timeout_secs = deadline.as_secs(), "Lookup timed out");
            return Err(AppError::UpstreamTimeout(format!(
                "{kind} lookup for {domain} did not finish within {}s",
                deadline.as_secs()
            )));
        }
    };

    if kind == AnalysisKind::Complete {
        let elapsed = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        if let Value::Object(map) = &mut data {
            map.insert("execution_time_ms".into(), Value::from(elapsed));
        }
    }

    cache_service::put(state, &key, &data, kind.ttl_secs()).await;

    Ok(Analysis {
        data,
        from_cache: false,
    })
}

/// Single-domain endpoint: normalize, cache-or-fetch, log to history.
pub async fn analyze(
    state: &AppState,
    ctx: &RequestContext,
    kind: AnalysisKind,
    raw_domain: Option<&str>,
) -> Result<Analysis, AppError> {
    let raw_domain = raw_domain
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| AppError::invalid("Domain parameter is required"))?;
    let domain = domain_name::normalize(raw_domain)?;

    let analysis = cached_lookup(state, kind, &domain).await?;
    history_service::record_analysis(
        state,
        ctx,
        kind,
        &domain,
        &analysis.data,
        analysis.from_cache,
    );

    Ok(analysis)
}

/// Run one lookup kind over up to [`MAX_BULK_DOMAINS`] domains.
///
/// The size check runs on the list as submitted, before normalization or
/// any provider call. A domain that fails to normalize or to resolve is
/// reported in place as `{ "error": "..." }`; the batch as a whole succeeds.
pub async fn bulk(
    state: &AppState,
    ctx: &RequestContext,
    kind: AnalysisKind,
    raw_domains: &[String],
) -> Result<Map<String, Value>, AppError> {
    if raw_domains.is_empty() {
        return Err(AppError::invalid("Domains array is required"));
    }
    if raw_domains.len() > MAX_BULK_DOMAINS {
        return Err(AppError::invalid(format!(
            "Maximum {MAX_BULK_DOMAINS} domains per bulk request"
        )));
    }
    if !kind.is_bulk_eligible() {
        return Err(AppError::invalid(format!(
            "Invalid type '{kind}': expected dns, whois, blacklist or ssl"
        )));
    }

    let mut results = Map::new();
    let mut domains: Vec<String> = Vec::with_capacity(raw_domains.len());
    for raw in raw_domains {
        match domain_name::normalize(raw) {
            Ok(domain) if !domains.contains(&domain) => domains.push(domain),
            Ok(_) => {}
            Err(e) => {
                results.insert(raw.trim().to_string(), error_entry(&e));
            }
        }
    }

    let lookups: Vec<(String, Result<Analysis, AppError>)> = stream::iter(domains)
        .map(|domain| async move {
            let result = cached_lookup(state, kind, &domain).await;
            (domain, result)
        })
        .buffer_unordered(BULK_CONCURRENCY)
        .collect()
        .await;

    for (domain, result) in lookups {
        let entry = match result {
            Ok(analysis) => {
                history_service::record_analysis(
                    state,
                    ctx,
                    kind,
                    &domain,
                    &analysis.data,
                    analysis.from_cache,
                );
                analysis.data
            }
            Err(e) => error_entry(&e),
        };
        results.insert(domain, entry);
    }

    tracing::info!(%kind, count = results.len(), "Bulk lookup finished");
    Ok(results)
}

/// `{ "error": message }` for per-item failures.
pub fn error_entry(err: &AppError) -> Value {
    serde_json::json!({ "error": err.public_message() })
}
