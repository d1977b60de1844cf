//! Periodic cleanup of expired rate windows and cache entries.

use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PruneReport {
    pub rate_windows: u64,
    pub cache_entries: u64,
}

pub async fn prune_expired(state: &AppState) -> Result<PruneReport, AppError> {
    let now = state.now();
    let rate_windows = state.stores.rate_limits.prune_windows(now).await?;
    let cache_entries = state.stores.cache.prune(now).await?;
    Ok(PruneReport {
        rate_windows,
        cache_entries,
    })
}

pub fn spawn_maintenance(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(state.config.maintenance_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match prune_expired(&state).await {
                Ok(report) => tracing::info!(
                    rate_windows = report.rate_windows,
                    cache_entries = report.cache_entries,
                    "Pruned expired rows"
                ),
                Err(e) => tracing::warn!(error = %e, "Maintenance pass failed"),
            }
        }
    })
}
