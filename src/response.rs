use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::dimensions::DimensionKind;
use crate::limiter::RateLimitCheckResult;

/// Generic error body: `{ "error": ..., "message": ... }`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
        }
    }

    /// Body for the fail-closed outage case. Deliberately distinct from a
    /// quota denial: the client is not over budget and must not be told to
    /// slow down.
    pub fn service_unavailable() -> Self {
        Self::new(
            "service_unavailable",
            "rate limiting is temporarily unavailable for this endpoint, please retry shortly",
        )
    }
}

/// 429 body identifying which dimension ran out.
#[derive(Debug, Serialize)]
pub struct RateLimitExceededBody {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<DimensionKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    /// Unix seconds when the binding window resets.
    pub reset_at: i64,
}

impl RateLimitExceededBody {
    pub fn from_result(result: &RateLimitCheckResult) -> Self {
        let binding = result.binding_denial();
        let message = match binding {
            Some(d) => format!(
                "{} rate limit of {} requests exceeded",
                d.kind.as_str(),
                d.result.limit
            ),
            None => "rate limit exceeded".to_string(),
        };

        Self {
            error: "rate_limit_exceeded".to_string(),
            message,
            dimension: binding.map(|d| d.kind),
            limit: binding.map(|d| d.result.limit),
            retry_after_secs: result.retry_after_secs,
            reset_at: result.reset_at_ms / 1000,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub store_connected: bool,
}

impl HealthResponse {
    pub fn new(store_connected: bool) -> Self {
        Self {
            status: if store_connected {
                "healthy".to_string()
            } else {
                "degraded".to_string()
            },
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store_connected,
        }
    }
}
