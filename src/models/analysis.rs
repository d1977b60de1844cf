//! Analysis kinds, history records and usage records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The lookups the gateway can serve. Each kind has its own cache TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Dns,
    Whois,
    Blacklist,
    Ssl,
    Complete,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 5] = [
        AnalysisKind::Dns,
        AnalysisKind::Whois,
        AnalysisKind::Blacklist,
        AnalysisKind::Ssl,
        AnalysisKind::Complete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisKind::Dns => "dns",
            AnalysisKind::Whois => "whois",
            AnalysisKind::Blacklist => "blacklist",
            AnalysisKind::Ssl => "ssl",
            AnalysisKind::Complete => "complete",
        }
    }

    /// Cache lifetime in seconds.
    pub fn ttl_secs(self) -> i64 {
        match self {
            AnalysisKind::Dns => 3_600,
            AnalysisKind::Whois => 86_400,
            AnalysisKind::Blacklist => 7_200,
            AnalysisKind::Ssl => 86_400,
            AnalysisKind::Complete => 21_600,
        }
    }

    /// Kinds accepted by the single-lookup bulk endpoint.
    pub fn is_bulk_eligible(self) -> bool {
        !matches!(self, AnalysisKind::Complete)
    }
}

impl FromStr for AnalysisKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dns" => Ok(AnalysisKind::Dns),
            "whois" => Ok(AnalysisKind::Whois),
            "blacklist" => Ok(AnalysisKind::Blacklist),
            "ssl" => Ok(AnalysisKind::Ssl),
            "complete" => Ok(AnalysisKind::Complete),
            other => Err(format!("unknown analysis kind: {other}")),
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a caller's analysis history.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub api_key_id: Uuid,
    pub domain: String,
    pub analysis_type: String,
    pub result: serde_json::Value,
    pub from_cache: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewHistoryRecord {
    pub user_id: Uuid,
    pub api_key_id: Uuid,
    pub domain: String,
    pub analysis_type: String,
    pub result: serde_json::Value,
    pub from_cache: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Filters for a history page.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub user_id: Uuid,
    pub domain: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// One authenticated request, recorded for `/usage`.
#[derive(Debug, Clone)]
pub struct NewUsageRecord {
    pub api_key_id: Uuid,
    pub user_id: Uuid,
    pub endpoint: String,
    pub method: String,
    pub status_code: i32,
    pub from_cache: bool,
    pub execution_time_ms: i64,
}

/// Aggregates over a caller's recent usage.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct UsageSummary {
    pub total_requests: i64,
    pub cached_requests: i64,
    /// Mean execution time in milliseconds
    pub avg_execution_time: f64,
    pub period_days: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_scans_cache_for_six_hours() {
        assert_eq!(AnalysisKind::Complete.ttl_secs(), 21_600);
    }

    #[test]
    fn only_single_lookups_are_bulk_eligible() {
        let eligible: Vec<_> = AnalysisKind::ALL
            .into_iter()
            .filter(|k| k.is_bulk_eligible())
            .collect();
        assert_eq!(eligible.len(), 4);
    }
}
