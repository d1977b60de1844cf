//! Recurring scans.
//!
//! A background loop wakes every `SCHEDULER_INTERVAL_SECS`, runs every
//! active schedule whose `next_run_at` has passed and moves it forward by
//! its frequency.

use serde_json::{Map, Value, json};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain_name;
use crate::error::AppError;
use crate::models::schedule::{
    CreateScheduleRequest, ExecutionStatus, Schedule, ScheduleExecution, UpdateScheduleRequest,
};
use crate::models::{analysis::AnalysisKind, webhook::WebhookEvent};
use crate::services::{analysis_service, webhook_service};
use crate::state::AppState;

/// Schedules picked up per scheduler tick.
const DUE_BATCH: i64 = 25;
pub const EXECUTION_HISTORY_LIMIT: i64 = 50;
const MAX_NAME_LEN: usize = 200;

pub async fn create_schedule(
    state: &AppState,
    user_id: Uuid,
    request: CreateScheduleRequest,
) -> Result<Schedule, AppError> {
    let name = validate_name(&request.name)?;
    let domains = validate_domains(state, &request.domains)?;
    let now = state.now();

    let schedule = Schedule {
        id: Uuid::new_v4(),
        user_id,
        name,
        domains,
        frequency: request.frequency,
        scan_type: request.scan_type.unwrap_or(AnalysisKind::Complete),
        options: request.options.unwrap_or_else(|| json!({})),
        is_active: true,
        next_run_at: request.frequency.next_after(now),
        last_run_at: None,
        created_at: now,
        updated_at: now,
    };

    state.stores.schedules.insert(&schedule).await?;
    tracing::info!(schedule_id = %schedule.id, %user_id, frequency = schedule.frequency.as_str(), "Schedule created");

    Ok(schedule)
}

pub async fn list_schedules(state: &AppState, user_id: Uuid) -> Result<Vec<Schedule>, AppError> {
    state.stores.schedules.list(user_id).await
}

pub async fn get_schedule(
    state: &AppState,
    user_id: Uuid,
    schedule_id: Uuid,
) -> Result<Schedule, AppError> {
    state
        .stores
        .schedules
        .get(user_id, schedule_id)
        .await?
        .ok_or_else(|| AppError::not_found("Schedule"))
}

/// Execution history of one of the caller's schedules, newest first.
pub async fn list_executions(
    state: &AppState,
    user_id: Uuid,
    schedule_id: Uuid,
) -> Result<Vec<ScheduleExecution>, AppError> {
    let schedule = get_schedule(state, user_id, schedule_id).await?;
    state
        .stores
        .schedules
        .executions(schedule.id, EXECUTION_HISTORY_LIMIT)
        .await
}

/// Partial update. Changing the frequency restarts the countdown from now.
pub async fn update_schedule(
    state: &AppState,
    user_id: Uuid,
    schedule_id: Uuid,
    request: UpdateScheduleRequest,
) -> Result<Schedule, AppError> {
    let mut schedule = get_schedule(state, user_id, schedule_id).await?;
    let now = state.now();

    if let Some(name) = request.name {
        schedule.name = validate_name(&name)?;
    }
    if let Some(domains) = request.domains {
        schedule.domains = validate_domains(state, &domains)?;
    }
    if let Some(frequency) = request.frequency {
        if frequency != schedule.frequency {
            schedule.next_run_at = frequency.next_after(now);
        }
        schedule.frequency = frequency;
    }
    if let Some(scan_type) = request.scan_type {
        schedule.scan_type = scan_type;
    }
    if let Some(options) = request.options {
        schedule.options = options;
    }
    if let Some(is_active) = request.is_active {
        // A schedule switched back on does not replay the runs it missed
        if is_active && !schedule.is_active && schedule.next_run_at < now {
            schedule.next_run_at = schedule.frequency.next_after(now);
        }
        schedule.is_active = is_active;
    }
    schedule.updated_at = now;

    state.stores.schedules.update(&schedule).await?;

    Ok(schedule)
}

pub async fn delete_schedule(
    state: &AppState,
    user_id: Uuid,
    schedule_id: Uuid,
) -> Result<(), AppError> {
    if !state.stores.schedules.delete(user_id, schedule_id).await? {
        return Err(AppError::not_found("Schedule"));
    }
    tracing::info!(%schedule_id, %user_id, "Schedule deleted");
    Ok(())
}

/// Run every schedule that is due. Returns how many ran.
pub async fn run_due(state: &AppState) -> Result<usize, AppError> {
    let now = state.now();
    let due = state.stores.schedules.due(now, DUE_BATCH).await?;

    for schedule in &due {
        // next_run_at moves before the run starts
        state
            .stores
            .schedules
            .mark_ran(schedule.id, now, schedule.frequency.next_after(now))
            .await?;

        if let Err(e) = execute(state, schedule).await {
            tracing::error!(schedule_id = %schedule.id, error = %e, "Scheduled run failed");
        }
    }

    Ok(due.len())
}

async fn execute(state: &AppState, schedule: &Schedule) -> Result<ScheduleExecution, AppError> {
    let mut execution = ScheduleExecution {
        id: Uuid::new_v4(),
        schedule_id: schedule.id,
        status: ExecutionStatus::Running,
        results: json!({}),
        started_at: state.now(),
        completed_at: None,
    };
    state.stores.schedules.insert_execution(&execution).await?;

    let mut results = Map::new();
    let mut failed = 0usize;
    for domain in &schedule.domains {
        let entry = match analysis_service::cached_lookup(state, schedule.scan_type, domain).await
        {
            Ok(analysis) => analysis.data,
            Err(e) => {
                failed += 1;
                analysis_service::error_entry(&e)
            }
        };
        results.insert(domain.clone(), entry);
    }

    let status = if !schedule.domains.is_empty() && failed == schedule.domains.len() {
        ExecutionStatus::Failed
    } else {
        ExecutionStatus::Completed
    };
    let completed_at = state.now();
    execution.status = status;
    execution.results = Value::Object(results);
    execution.completed_at = Some(completed_at);

    state
        .stores
        .schedules
        .complete_execution(execution.id, status, execution.results.clone(), completed_at)
        .await?;

    tracing::info!(
        schedule_id = %schedule.id,
        execution_id = %execution.id,
        status = status.as_str(),
        failed,
        "Scheduled run finished"
    );

    webhook_service::notify(
        state,
        schedule.user_id,
        WebhookEvent::ScheduleCompleted,
        json!({
            "schedule_id": schedule.id,
            "execution_id": execution.id,
            "name": schedule.name,
            "status": status,
            "domains": schedule.domains.len(),
            "failed": failed,
        }),
    )
    .await;

    Ok(execution)
}

/// Poll for due schedules until the runtime shuts down.
pub fn spawn_scheduler(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(state.config.scheduler_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match run_due(&state).await {
                Ok(0) => {}
                Ok(ran) => tracing::info!(ran, "Scheduler tick"),
                Err(e) => tracing::error!(error = %e, "Scheduler tick failed"),
            }
        }
    })
}

fn validate_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::invalid("Schedule name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::invalid(format!(
            "Schedule name exceeds {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

fn validate_domains(state: &AppState, raw: &[String]) -> Result<Vec<String>, AppError> {
    let max = state.config.bulk_job_max_domains;
    if raw.is_empty() {
        return Err(AppError::invalid("Domains array is required"));
    }
    if raw.len() > max {
        return Err(AppError::invalid(format!(
            "Maximum {max} domains per schedule"
        )));
    }
    domain_name::normalize_all(raw)
}
