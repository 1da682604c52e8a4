//! Projection of an aggregate decision into standard response headers.

use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::limiter::RateLimitCheckResult;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Build the rate limit headers for a checked request.
///
/// `Limit`/`Remaining` reflect the most restrictive checked dimension
/// (smallest limit, ties broken user > organization > ip); `Reset` is the
/// aggregate reset in unix seconds; `Retry-After` appears only on denial.
pub fn rate_limit_headers(result: &RateLimitCheckResult) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Some(binding) = result.most_restrictive() {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(binding.result.limit));
        headers.insert(
            X_RATELIMIT_REMAINING,
            HeaderValue::from(binding.result.remaining),
        );
    }
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(result.reset_at_ms / 1000));
    if let Some(retry) = result.retry_after_secs {
        headers.insert(RETRY_AFTER, HeaderValue::from(retry));
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::DimensionKind;
    use crate::limiter::DimensionResult;
    use crate::window::RateLimitResult;

    fn dim(kind: DimensionKind, allowed: bool, limit: u64, remaining: u64) -> DimensionResult {
        DimensionResult {
            kind,
            result: RateLimitResult {
                allowed,
                limit,
                remaining,
                reset_at_ms: 120_000,
                retry_after_secs: (!allowed).then_some(42),
            },
        }
    }

    fn check_result(dimensions: Vec<DimensionResult>) -> RateLimitCheckResult {
        let allowed = dimensions.iter().all(|d| d.result.allowed);
        RateLimitCheckResult {
            allowed,
            dimensions,
            reset_at_ms: 120_000,
            retry_after_secs: (!allowed).then_some(42),
            degraded: false,
        }
    }

    #[test]
    fn most_restrictive_dimension_drives_limit_headers() {
        let result = check_result(vec![
            dim(DimensionKind::User, true, 10, 4),
            dim(DimensionKind::Organization, true, 3, 1),
        ]);

        let headers = rate_limit_headers(&result);
        assert_eq!(headers[&X_RATELIMIT_LIMIT], "3");
        assert_eq!(headers[&X_RATELIMIT_REMAINING], "1");
        assert_eq!(headers[&X_RATELIMIT_RESET], "120");
        assert!(!headers.contains_key(RETRY_AFTER));
    }

    #[test]
    fn equal_limits_fall_back_to_priority_order() {
        let result = check_result(vec![
            dim(DimensionKind::Ip, true, 5, 0),
            dim(DimensionKind::User, true, 5, 2),
        ]);

        let headers = rate_limit_headers(&result);
        // user > organization > ip on ties.
        assert_eq!(headers[&X_RATELIMIT_REMAINING], "2");
    }

    #[test]
    fn retry_after_present_only_when_denied() {
        let result = check_result(vec![dim(DimensionKind::User, false, 5, 0)]);

        let headers = rate_limit_headers(&result);
        assert_eq!(headers[&RETRY_AFTER], "42");
        assert_eq!(headers[&X_RATELIMIT_REMAINING], "0");
    }
}
