use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::dimensions::RequestIdentifiers;
use crate::error::RateLimitError;
use crate::headers::rate_limit_headers;
use crate::limiter::{epoch_ms, RateLimitCheckResult};
use crate::middleware::RateLimitState;
use crate::response::HealthResponse;

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    pub endpoint: String,
}

/// Direct check endpoint for callers that resolve identifiers themselves.
/// Returns the aggregate decision as JSON with the standard rate headers
/// attached; 429 when denied, 503 when the store is down and the endpoint
/// fails closed.
pub async fn check_rate_limit(
    State(state): State<RateLimitState>,
    Json(payload): Json<CheckRequest>,
) -> Result<impl IntoResponse, RateLimitError> {
    let Some(config) = state.registry.get(&payload.endpoint) else {
        // No configuration means the endpoint is intentionally unmetered.
        let result = RateLimitCheckResult::unmetered(epoch_ms());
        return Ok(Json(result).into_response());
    };

    let identifiers = RequestIdentifiers {
        user_id: payload.user_id,
        organization_id: payload.organization_id,
        ip_address: payload.ip_address,
    };

    let result = state
        .limiter
        .check_rate_limit(&identifiers, &payload.endpoint, config)
        .await?;

    let status = if result.allowed {
        StatusCode::OK
    } else {
        StatusCode::TOO_MANY_REQUESTS
    };
    let headers = rate_limit_headers(&result);

    let mut response = (status, Json(result)).into_response();
    response.headers_mut().extend(headers);
    Ok(response)
}

pub async fn health_check(State(state): State<RateLimitState>) -> impl IntoResponse {
    let store_connected = state.limiter.store_healthy().await;
    Json(HealthResponse::new(store_connected))
}

pub async fn readiness_check(State(state): State<RateLimitState>) -> impl IntoResponse {
    let store_connected = state.limiter.store_healthy().await;

    if store_connected {
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "store": "connected"
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "store": "disconnected"
            })),
        )
    }
}
