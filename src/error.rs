use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::response::ErrorBody;

/// Errors produced while enforcing rate limits.
///
/// Quota exhaustion is not an error: it is a normal decision outcome carried
/// by `RateLimitCheckResult`. This taxonomy covers infrastructure faults and
/// misconfiguration only.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// The shared counting store could not be reached (or timed out).
    /// Resolved per-endpoint by the fail-open/fail-closed policy; never
    /// left unhandled.
    #[error("counting store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store is down and the endpoint is fail-closed: enforcement is
    /// impossible and the request must be blocked. Distinct from a quota
    /// denial so the HTTP layer emits 503, never 429.
    #[error("rate limiting temporarily unavailable for fail-closed endpoint")]
    EnforcementUnavailable,

    /// Invalid rate limit configuration (e.g. a registry entry with no
    /// dimension limits).
    #[error("invalid rate limit configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RateLimitError>;

impl From<redis::RedisError> for RateLimitError {
    fn from(err: redis::RedisError) -> Self {
        RateLimitError::StoreUnavailable(err.to_string())
    }
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        match self {
            RateLimitError::EnforcementUnavailable | RateLimitError::StoreUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorBody::service_unavailable()),
            )
                .into_response(),
            RateLimitError::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new("configuration_error", msg)),
            )
                .into_response(),
        }
    }
}
