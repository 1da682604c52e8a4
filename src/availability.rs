//! Degradation policy for an unreachable counting store.
//!
//! There is no persistent health state machine: every check re-probes the
//! store implicitly by attempting its atomic unit, and the first I/O error
//! (or timeout) during a check settles that request's outcome per the
//! endpoint's configured strategy.

use std::time::Duration;
use tracing::warn;

use crate::error::{RateLimitError, Result};
use crate::limiter::RateLimitCheckResult;
use crate::limits::{FailStrategy, RateLimitConfig};

/// Fallback reset horizon if a config somehow carries no window. Configs
/// are validated at load time, so this is unreachable in practice.
const DEFAULT_DEGRADED_WINDOW: Duration = Duration::from_secs(60);

/// Resolve a store failure into a decision.
///
/// Fail-open grants the request as if under quota, guessing the reset
/// conservatively at the largest configured window. Fail-closed surfaces a
/// distinct unavailable signal so the caller emits 503, never a 429.
pub fn resolve_unavailable(
    endpoint: &str,
    config: &RateLimitConfig,
    now_ms: i64,
    error: &RateLimitError,
) -> Result<RateLimitCheckResult> {
    match config.fail_strategy {
        FailStrategy::Open => {
            warn!(
                endpoint,
                error = %error,
                "counting store unavailable, failing open without quota enforcement"
            );
            let window = config.largest_window().unwrap_or(DEFAULT_DEGRADED_WINDOW);
            Ok(RateLimitCheckResult::degraded_open(
                now_ms + window.as_millis() as i64,
            ))
        }
        FailStrategy::Closed => {
            warn!(
                endpoint,
                error = %error,
                "counting store unavailable, failing closed"
            );
            Err(RateLimitError::EnforcementUnavailable)
        }
    }
}
