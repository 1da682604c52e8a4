//! Embeddable axum middleware gating metered routes.
//!
//! Identifier resolution is delegated to collaborators: the auth layer
//! stamps `x-user-id` / `x-organization-id` on the request after verifying
//! the session, and the client IP comes from the forwarding headers or the
//! socket address. The middleware only turns those identifiers plus the
//! endpoint's config into an allow/deny decision.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::dimensions::RequestIdentifiers;
use crate::headers::rate_limit_headers;
use crate::limiter::{RateLimitCheckResult, RateLimiter};
use crate::limits::LimitRegistry;
use crate::response::RateLimitExceededBody;

/// Shared state for the middleware and the service handlers.
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub registry: Arc<LimitRegistry>,
}

impl RateLimitState {
    pub fn new(limiter: Arc<RateLimiter>, registry: Arc<LimitRegistry>) -> Self {
        Self { limiter, registry }
    }
}

/// Rate limiting middleware. Unmetered paths pass through untouched;
/// metered ones gain the standard rate headers, a 429 on quota exhaustion,
/// or a 503 when the store is down and the endpoint fails closed.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let endpoint = request.uri().path().to_string();
    let Some(config) = state.registry.get(&endpoint) else {
        return next.run(request).await;
    };

    let identifiers = RequestIdentifiers {
        user_id: header_string(&request, "x-user-id"),
        organization_id: header_string(&request, "x-organization-id"),
        ip_address: client_ip(&request),
    };

    match state
        .limiter
        .check_rate_limit(&identifiers, &endpoint, config)
        .await
    {
        Ok(result) if result.allowed => {
            let headers = rate_limit_headers(&result);
            let mut response = next.run(request).await;
            if result.is_metered() || result.degraded {
                response.headers_mut().extend(headers);
            }
            response
        }
        Ok(result) => denied_response(&result),
        Err(err) => err.into_response(),
    }
}

fn denied_response(result: &RateLimitCheckResult) -> Response {
    let body = RateLimitExceededBody::from_result(result);
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    response.headers_mut().extend(rate_limit_headers(result));
    response
}

fn header_string(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Extract the client IP, preferring forwarding headers over the socket
/// address. Returns `None` when nothing usable is present, in which case
/// the ip dimension is simply skipped.
pub fn client_ip(request: &Request) -> Option<String> {
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return Some(first_ip.to_string());
                }
            }
        }
    }

    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return Some(ip_str.to_string());
        }
    }

    request
        .extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let mut request = Request::new(axum::body::Body::empty());
        request.headers_mut().insert(
            "x-forwarded-for",
            HeaderValue::from_static("192.168.1.1, 10.0.0.1"),
        );

        assert_eq!(client_ip(&request), Some("192.168.1.1".to_string()));
    }

    #[test]
    fn client_ip_falls_back_to_real_ip_header() {
        let mut request = Request::new(axum::body::Body::empty());
        request
            .headers_mut()
            .insert("x-real-ip", HeaderValue::from_static("203.0.113.1"));

        assert_eq!(client_ip(&request), Some("203.0.113.1".to_string()));
    }

    #[test]
    fn client_ip_absent_when_nothing_usable() {
        let request = Request::new(axum::body::Body::empty());
        assert_eq!(client_ip(&request), None);
    }

    #[test]
    fn client_ip_reads_connect_info() {
        let mut request = Request::new(axum::body::Body::empty());
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        request
            .extensions_mut()
            .insert(axum::extract::ConnectInfo(addr));

        assert_eq!(client_ip(&request), Some("127.0.0.1".to_string()));
    }
}
