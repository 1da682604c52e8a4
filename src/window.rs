//! Sliding-window counting for a single key.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::store::CounterStore;

/// Outcome of one dimension's check.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// When the binding window boundary next moves: the oldest live entry
    /// plus the window.
    pub reset_at_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// Runs the atomic purge/count/insert/expire unit for one key and derives
/// the per-dimension decision.
///
/// The decision counts entries *before* the insert, so the window can
/// briefly hold `limit + 1` entries (the just-inserted attempt counts
/// toward the next check, not this one). That keeps the enforcement
/// boundary exact without a second round trip: the Nth request, 1-indexed,
/// is the last one allowed.
#[derive(Clone)]
pub struct SlidingWindowCounter {
    store: Arc<dyn CounterStore>,
}

impl SlidingWindowCounter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    pub async fn check(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
        now_ms: i64,
    ) -> Result<RateLimitResult> {
        let snapshot = self.store.record_and_count(key, window, now_ms).await?;

        let allowed = snapshot.count_before < limit;
        let remaining = if allowed {
            limit - snapshot.count_before - 1
        } else {
            0
        };
        let reset_at_ms = snapshot.oldest_live_ms + window.as_millis() as i64;
        let retry_after_secs = (!allowed).then(|| retry_after_secs(reset_at_ms, now_ms));

        Ok(RateLimitResult {
            allowed,
            limit,
            remaining,
            reset_at_ms,
            retry_after_secs,
        })
    }
}

/// Seconds a denied caller must wait, rounded up, never negative.
pub fn retry_after_secs(reset_at_ms: i64, now_ms: i64) -> u64 {
    let delta = (reset_at_ms - now_ms).max(0);
    ((delta + 999) / 1000) as u64
}
