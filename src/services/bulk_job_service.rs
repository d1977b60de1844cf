//! Asynchronous bulk scan jobs.
//!
//! # Lifecycle
//!
//! ```text
//! pending ──► running ──► completed | failed
//!    │           │
//!    └───────────┴──► cancelled
//! ```
//!
//! The worker re-reads the job status before each domain, so a cancellation
//! takes effect after at most one in-flight lookup.

use serde_json::json;
use uuid::Uuid;

use crate::domain_name;
use crate::error::AppError;
use crate::models::bulk_job::{BulkJob, BulkJobResponse, CreateBulkJobRequest, JobStatus};
use crate::models::webhook::WebhookEvent;
use crate::services::{analysis_service, webhook_service};
use crate::state::AppState;

pub async fn create_job(
    state: &AppState,
    user_id: Uuid,
    request: CreateBulkJobRequest,
) -> Result<BulkJobResponse, AppError> {
    let max = state.config.bulk_job_max_domains;
    if request.domains.is_empty() {
        return Err(AppError::invalid("Domains array is required"));
    }
    if request.domains.len() > max {
        return Err(AppError::invalid(format!(
            "Maximum {max} domains per bulk job"
        )));
    }

    let domains = domain_name::normalize_all(&request.domains)?;

    let job = BulkJob {
        id: Uuid::new_v4(),
        user_id,
        scan_type: request.scan_type,
        domains,
        status: JobStatus::Pending,
        processed: 0,
        failed: 0,
        results: serde_json::Map::new(),
        created_at: state.now(),
        started_at: None,
        completed_at: None,
    };

    state.stores.bulk_jobs.insert(&job).await?;
    tracing::info!(job_id = %job.id, %user_id, domains = job.domains.len(), "Bulk job created");

    tokio::spawn(run_job(state.clone(), job.id, job.user_id));

    Ok(BulkJobResponse::from_job(job, false))
}

pub async fn get_job(
    state: &AppState,
    user_id: Uuid,
    job_id: Uuid,
    include_results: bool,
) -> Result<BulkJobResponse, AppError> {
    let job = state
        .stores
        .bulk_jobs
        .get(user_id, job_id)
        .await?
        .ok_or_else(|| AppError::not_found("Bulk job"))?;

    Ok(BulkJobResponse::from_job(job, include_results))
}

/// Cancel a pending or running job.
///
/// # Errors
///
/// - `NotFound` if the job does not exist for this user
/// - `InvalidRequest` if it already finished
pub async fn cancel_job(
    state: &AppState,
    user_id: Uuid,
    job_id: Uuid,
) -> Result<BulkJobResponse, AppError> {
    let job = state
        .stores
        .bulk_jobs
        .get(user_id, job_id)
        .await?
        .ok_or_else(|| AppError::not_found("Bulk job"))?;

    if job.status.is_finished()
        || !state.stores.bulk_jobs.cancel(user_id, job_id, state.now()).await?
    {
        return Err(AppError::invalid(format!(
            "Job cannot be cancelled in status '{}'",
            job.status.as_str()
        )));
    }

    tracing::info!(%job_id, %user_id, "Bulk job cancelled");
    get_job(state, user_id, job_id, false).await
}

/// Worker body. Errors are logged; a store failure marks the job failed.
pub async fn run_job(state: AppState, job_id: Uuid, user_id: Uuid) {
    if let Err(e) = process(&state, job_id, user_id).await {
        tracing::error!(%job_id, error = %e, "Bulk job failed");
        if let Err(e) = state
            .stores
            .bulk_jobs
            .finish(job_id, JobStatus::Failed, state.now())
            .await
        {
            tracing::error!(%job_id, error = %e, "Failed to mark bulk job as failed");
        }
    }
}

async fn process(state: &AppState, job_id: Uuid, user_id: Uuid) -> Result<(), AppError> {
    let jobs = &state.stores.bulk_jobs;

    if !jobs.mark_running(job_id, state.now()).await? {
        tracing::debug!(%job_id, "Bulk job no longer pending, not starting");
        return Ok(());
    }

    let job = jobs
        .get(user_id, job_id)
        .await?
        .ok_or_else(|| AppError::Internal(format!("bulk job {job_id} vanished")))?;

    for domain in &job.domains {
        if jobs.status(job_id).await? != Some(JobStatus::Running) {
            tracing::info!(%job_id, "Bulk job stopped before {domain}");
            return Ok(());
        }

        let (result, failed) =
            match analysis_service::cached_lookup(state, job.scan_type, domain).await {
                Ok(analysis) => (analysis.data, false),
                Err(e) => (analysis_service::error_entry(&e), true),
            };
        jobs.record_result(job_id, domain, result, failed).await?;
    }

    if !jobs.finish(job_id, JobStatus::Completed, state.now()).await? {
        return Ok(());
    }

    let finished = jobs.get(user_id, job_id).await?;
    let (processed, failed) = finished
        .as_ref()
        .map_or((0, 0), |j| (j.processed, j.failed));
    tracing::info!(%job_id, processed, failed, "Bulk job completed");

    webhook_service::notify(
        state,
        user_id,
        WebhookEvent::BulkCompleted,
        json!({
            "job_id": job_id,
            "status": JobStatus::Completed,
            "scan_type": job.scan_type,
            "total": job.domains.len(),
            "processed": processed,
            "failed": failed,
        }),
    )
    .await;

    Ok(())
}
