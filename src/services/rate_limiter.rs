//! Per-key hourly request ceilings.
//!
//! Windows are aligned to clock hours: every request between 10:00:00 and
//! 10:59:59 UTC counts against the same `(key, 10:00)` row, and the first
//! request after 11:00 starts a new one. The check and the increment are a
//! single store operation, so concurrent requests cannot overshoot.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::store::RateLimitStore;

/// Outcome of one admission attempt, carried into the `X-RateLimit-*` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub admitted: bool,
    pub limit: i32,
    pub remaining: i32,
    /// Epoch seconds of the next window start
    pub reset: i64,
}

/// `[floor(now, 1h), floor(now, 1h) + 1h)`
pub fn window_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = now
        .duration_trunc(TimeDelta::hours(1))
        .unwrap_or(now);
    (start, start + TimeDelta::hours(1))
}

/// Count one request for `key_id` against `ceiling`.
///
/// A ceiling of zero or below admits nothing.
pub async fn acquire(
    store: &dyn RateLimitStore,
    key_id: Uuid,
    ceiling: i32,
    now: DateTime<Utc>,
) -> Result<RateLimitDecision, AppError> {
    let (window_start, window_end) = window_bounds(now);
    let reset = window_end.timestamp();

    let rejected = RateLimitDecision {
        admitted: false,
        limit: ceiling,
        remaining: 0,
        reset,
    };

    if ceiling <= 0 {
        return Ok(rejected);
    }

    match store
        .increment_window(key_id, window_start, window_end, ceiling)
        .await?
    {
        // count is after the increment, so count - 1 requests came before this one
        Some(count) => Ok(RateLimitDecision {
            admitted: true,
            limit: ceiling,
            remaining: (ceiling - count).max(0),
            reset,
        }),
        None => {
            tracing::info!(%key_id, ceiling, "Rate limit reached");
            Ok(rejected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;

    #[test]
    fn windows_align_to_clock_hours() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 10, 59, 59).unwrap();
        let (start, end) = window_bounds(now);

        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 3, 1, 11, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn remaining_counts_down_to_zero_then_rejects() {
        let store = MemoryStore::default();
        let key = Uuid::new_v4();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 10, 15, 0).unwrap();

        let remaining: Vec<i32> = {
            let mut out = Vec::new();
            for _ in 0..3 {
                let decision = acquire(&store, key, 3, now).await.unwrap();
                assert!(decision.admitted);
                out.push(decision.remaining);
            }
            out
        };
        assert_eq!(remaining, vec![2, 1, 0]);

        let decision = acquire(&store, key, 3, now).await.unwrap();
        assert!(!decision.admitted);
        assert_eq!(decision.reset, Utc.with_ymd_and_hms(2025, 3, 1, 11, 0, 0).unwrap().timestamp());
    }

    #[tokio::test]
    async fn zero_ceiling_admits_nothing() {
        let store = MemoryStore::default();
        let decision = acquire(&store, Uuid::new_v4(), 0, Utc::now()).await.unwrap();
        assert!(!decision.admitted);
    }
}
