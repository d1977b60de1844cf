//! Bulk scan job models.
//!
//! A bulk job is the asynchronous, larger counterpart of the synchronous
//! `/api/v2/bulk` endpoint: the caller creates a job, a background worker
//! walks its domains, and the caller polls for progress and results.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::analysis::AnalysisKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_finished(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Cancelled | JobStatus::Failed
        )
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "cancelled" => Ok(JobStatus::Cancelled),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BulkJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub scan_type: AnalysisKind,
    pub domains: Vec<String>,
    pub status: JobStatus,
    pub processed: i32,
    pub failed: i32,
    /// domain -> lookup result, or `{ "error": "..." }`
    pub results: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Request body for `POST /api/v2/advanced/bulk`.
///
/// ```json
/// { "domains": ["example.com", "example.org"], "scan_type": "dns" }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateBulkJobRequest {
    pub domains: Vec<String>,
    #[serde(default = "default_scan_type", alias = "type")]
    pub scan_type: AnalysisKind,
}

fn default_scan_type() -> AnalysisKind {
    AnalysisKind::Complete
}

/// Status view of a job. `results` is only filled when asked for.
#[derive(Debug, Serialize)]
pub struct BulkJobResponse {
    pub id: Uuid,
    pub scan_type: AnalysisKind,
    pub status: JobStatus,
    pub total: i32,
    pub processed: i32,
    pub failed: i32,
    pub progress_percent: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Map<String, serde_json::Value>>,
}

impl BulkJobResponse {
    pub fn from_job(job: BulkJob, include_results: bool) -> Self {
        let total = job.domains.len() as i32;
        let progress_percent = if total == 0 {
            100.0
        } else {
            (f64::from(job.processed) / f64::from(total) * 1000.0).round() / 10.0
        };

        Self {
            id: job.id,
            scan_type: job.scan_type,
            status: job.status,
            total,
            processed: job.processed,
            failed: job.failed,
            progress_percent,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            results: include_results.then_some(job.results),
        }
    }
}
