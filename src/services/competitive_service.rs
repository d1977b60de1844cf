//! Side-by-side comparison of several domains.
//!
//! Every domain gets a complete scan (cache-or-fetch). Each scan is reduced
//! to a [`Summary`] and the summaries are ranked by score.

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::domain_name;
use crate::error::AppError;
use crate::middleware::auth::RequestContext;
use crate::models::analysis::AnalysisKind;
use crate::services::{analysis_service, history_service};
use crate::state::AppState;

pub const MIN_DOMAINS: usize = 2;
pub const MAX_DOMAINS: usize = 10;

const SSL_POINTS: u32 = 40;
const CLEAN_REPUTATION_POINTS: u32 = 40;
const POINTS_PER_RECORD_TYPE: u32 = 4;
const MAX_COUNTED_RECORD_TYPES: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub score: u32,
    pub ssl_valid: Option<bool>,
    pub ssl_days_until_expiry: Option<i64>,
    pub blacklisted: Option<bool>,
    pub dns_record_types: u32,
}

impl Summary {
    /// Missing or failed sections count as zero points.
    pub fn from_scan(scan: &Value) -> Self {
        let ssl_valid = scan
            .pointer("/ssl/is_valid")
            .and_then(Value::as_bool);
        let ssl_days_until_expiry = scan
            .pointer("/ssl/days_until_expiry")
            .and_then(Value::as_i64);
        let blacklisted = scan
            .pointer("/blacklist/is_blacklisted")
            .and_then(Value::as_bool);
        let dns_record_types = scan
            .pointer("/dns/records")
            .and_then(Value::as_object)
            .map(|records| {
                records
                    .values()
                    .filter(|v| v.as_array().is_some_and(|a| !a.is_empty()))
                    .count()
            })
            .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX));

        let mut score = 0;
        if ssl_valid == Some(true) {
            score += SSL_POINTS;
        }
        if blacklisted == Some(false) {
            score += CLEAN_REPUTATION_POINTS;
        }
        score += dns_record_types.min(MAX_COUNTED_RECORD_TYPES) * POINTS_PER_RECORD_TYPE;

        Self {
            score,
            ssl_valid,
            ssl_days_until_expiry,
            blacklisted,
            dns_record_types,
        }
    }
}

/// `{ domains: { domain: { scan, summary } | { error } }, comparison }`
pub async fn compare(
    state: &AppState,
    ctx: &RequestContext,
    raw_domains: &[String],
) -> Result<Value, AppError> {
    if raw_domains.len() > MAX_DOMAINS {
        return Err(AppError::invalid(format!(
            "Maximum {MAX_DOMAINS} domains for competitive analysis"
        )));
    }
    let domains = domain_name::normalize_all(raw_domains)?;
    if domains.len() < MIN_DOMAINS {
        return Err(AppError::invalid(format!(
            "At least {MIN_DOMAINS} distinct domains are required for comparison"
        )));
    }

    let scans = futures::future::join_all(
        domains
            .iter()
            .map(|domain| analysis_service::cached_lookup(state, AnalysisKind::Complete, domain)),
    )
    .await;

    let mut entries = Map::new();
    let mut ranked: Vec<(String, Summary)> = Vec::new();
    for (domain, result) in domains.into_iter().zip(scans) {
        match result {
            Ok(analysis) => {
                history_service::record_analysis(
                    state,
                    ctx,
                    AnalysisKind::Complete,
                    &domain,
                    &analysis.data,
                    analysis.from_cache,
                );
                let summary = Summary::from_scan(&analysis.data);
                entries.insert(
                    domain.clone(),
                    json!({ "scan": analysis.data, "summary": summary }),
                );
                ranked.push((domain, summary));
            }
            Err(e) => {
                entries.insert(domain, analysis_service::error_entry(&e));
            }
        }
    }

    // Highest score first, ties by name for a stable order
    ranked.sort_by(|a, b| b.1.score.cmp(&a.1.score).then_with(|| a.0.cmp(&b.0)));

    let comparison = json!({
        "ranking": ranked
            .iter()
            .map(|(domain, summary)| json!({ "domain": domain, "score": summary.score }))
            .collect::<Vec<_>>(),
        "best": ranked.first().map(|(domain, _)| domain),
        "ssl_valid": ranked
            .iter()
            .filter(|(_, s)| s.ssl_valid == Some(true))
            .map(|(d, _)| d)
            .collect::<Vec<_>>(),
        "blacklisted": ranked
            .iter()
            .filter(|(_, s)| s.blacklisted == Some(true))
            .map(|(d, _)| d)
            .collect::<Vec<_>>(),
    });

    Ok(json!({ "domains": entries, "comparison": comparison }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_scores_each_section() {
        let scan = json!({
            "ssl": { "is_valid": true, "days_until_expiry": 80 },
            "blacklist": { "is_blacklisted": false },
            "dns": { "records": { "A": ["192.0.2.1"], "MX": ["10 mx.example.com."], "TXT": [] } },
        });

        let summary = Summary::from_scan(&scan);

        assert_eq!(summary.dns_record_types, 2);
        assert_eq!(summary.score, 40 + 40 + 8);
        assert_eq!(summary.ssl_days_until_expiry, Some(80));
    }

    #[test]
    fn failed_sections_score_nothing() {
        let scan = json!({ "ssl": { "error": "refused" }, "blacklist": { "error": "timeout" } });

        let summary = Summary::from_scan(&scan);

        assert_eq!(summary.score, 0);
        assert_eq!(summary.ssl_valid, None);
    }
}
