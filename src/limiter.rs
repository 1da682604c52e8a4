//! Multi-dimensional aggregation: the primary entry point of the limiter.

use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::availability;
use crate::dimensions::{DimensionKind, RequestIdentifiers};
use crate::error::{RateLimitError, Result};
use crate::keys;
use crate::limits::RateLimitConfig;
use crate::store::CounterStore;
use crate::window::{retry_after_secs, RateLimitResult, SlidingWindowCounter};

/// One checked dimension and its outcome.
#[derive(Debug, Clone, Serialize)]
pub struct DimensionResult {
    pub kind: DimensionKind,
    #[serde(flatten)]
    pub result: RateLimitResult,
}

/// Aggregate decision across every checked dimension.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitCheckResult {
    /// AND over all checked dimensions.
    pub allowed: bool,
    pub dimensions: Vec<DimensionResult>,
    /// Minimum reset over denied dimensions, or over all dimensions when
    /// everything allowed: callers never wait longer than necessary.
    pub reset_at_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    /// True when the decision was made without the counting store
    /// (fail-open grant during an outage).
    pub degraded: bool,
}

impl RateLimitCheckResult {
    /// No applicable dimension: the endpoint is effectively unmetered for
    /// this request.
    pub(crate) fn unmetered(now_ms: i64) -> Self {
        Self {
            allowed: true,
            dimensions: Vec::new(),
            reset_at_ms: now_ms,
            retry_after_secs: None,
            degraded: false,
        }
    }

    pub(crate) fn degraded_open(reset_at_ms: i64) -> Self {
        Self {
            allowed: true,
            dimensions: Vec::new(),
            reset_at_ms,
            retry_after_secs: None,
            degraded: true,
        }
    }

    /// Whether any dimension was actually counted for this request.
    pub fn is_metered(&self) -> bool {
        !self.dimensions.is_empty()
    }

    pub fn user_result(&self) -> Option<&RateLimitResult> {
        self.result_for(DimensionKind::User)
    }

    pub fn organization_result(&self) -> Option<&RateLimitResult> {
        self.result_for(DimensionKind::Organization)
    }

    pub fn ip_result(&self) -> Option<&RateLimitResult> {
        self.result_for(DimensionKind::Ip)
    }

    pub fn result_for(&self, kind: DimensionKind) -> Option<&RateLimitResult> {
        self.dimensions
            .iter()
            .find(|d| d.kind == kind)
            .map(|d| &d.result)
    }

    /// The dimension with the smallest limit among all checked dimensions,
    /// ties broken by the fixed priority order user > organization > ip.
    /// Drives header display.
    pub fn most_restrictive(&self) -> Option<&DimensionResult> {
        Self::smallest_limit(self.dimensions.iter())
    }

    /// The most restrictive dimension among those that denied.
    pub fn binding_denial(&self) -> Option<&DimensionResult> {
        Self::smallest_limit(self.dimensions.iter().filter(|d| !d.result.allowed))
    }

    fn smallest_limit<'a>(
        dimensions: impl Iterator<Item = &'a DimensionResult> + Clone,
    ) -> Option<&'a DimensionResult> {
        let mut best: Option<&DimensionResult> = None;
        for kind in DimensionKind::PRIORITY {
            if let Some(dim) = dimensions.clone().find(|d| d.kind == kind) {
                if best.is_none_or(|b| dim.result.limit < b.result.limit) {
                    best = Some(dim);
                }
            }
        }
        best
    }
}

/// Evaluates the configured dimensions for a request against the shared
/// counting store and combines the outcomes.
#[derive(Clone)]
pub struct RateLimiter {
    counter: SlidingWindowCounter,
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            counter: SlidingWindowCounter::new(store.clone()),
            store,
        }
    }

    /// Check a request against every dimension that has both an identifier
    /// and a configured limit.
    ///
    /// All applicable dimensions are evaluated even once one denies, so
    /// per-dimension results and header data stay complete; a denial in
    /// any dimension denies the aggregate regardless. A store failure is
    /// resolved by the endpoint's fail strategy and, under fail-closed,
    /// stops evaluation immediately.
    pub async fn check_rate_limit(
        &self,
        identifiers: &RequestIdentifiers,
        endpoint: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitCheckResult> {
        self.check_rate_limit_at(identifiers, endpoint, config, epoch_ms())
            .await
    }

    pub async fn check_rate_limit_at(
        &self,
        identifiers: &RequestIdentifiers,
        endpoint: &str,
        config: &RateLimitConfig,
        now_ms: i64,
    ) -> Result<RateLimitCheckResult> {
        let mut dimensions = Vec::new();

        for kind in DimensionKind::PRIORITY {
            let Some(identifier) = identifiers.get(kind) else {
                continue;
            };
            let Some(dim_limit) = config.limit_for(kind) else {
                continue;
            };

            let key = keys::window_key(kind, identifier, endpoint);
            match self
                .counter
                .check(&key, dim_limit.limit, dim_limit.window, now_ms)
                .await
            {
                Ok(result) => dimensions.push(DimensionResult { kind, result }),
                Err(err @ RateLimitError::StoreUnavailable(_)) => {
                    return availability::resolve_unavailable(endpoint, config, now_ms, &err);
                }
                Err(err) => return Err(err),
            }
        }

        if dimensions.is_empty() {
            return Ok(RateLimitCheckResult::unmetered(now_ms));
        }

        let allowed = dimensions.iter().all(|d| d.result.allowed);
        let reset_at_ms = if allowed {
            dimensions.iter().map(|d| d.result.reset_at_ms).min()
        } else {
            dimensions
                .iter()
                .filter(|d| !d.result.allowed)
                .map(|d| d.result.reset_at_ms)
                .min()
        }
        .unwrap_or(now_ms);
        let retry_after = (!allowed).then(|| retry_after_secs(reset_at_ms, now_ms));

        if !allowed {
            debug!(
                endpoint,
                dimension = ?dimensions
                    .iter()
                    .filter(|d| !d.result.allowed)
                    .map(|d| d.kind.as_str())
                    .collect::<Vec<_>>(),
                "request denied by rate limit"
            );
        }

        Ok(RateLimitCheckResult {
            allowed,
            dimensions,
            reset_at_ms,
            retry_after_secs: retry_after,
            degraded: false,
        })
    }

    pub async fn store_healthy(&self) -> bool {
        self.store.ping().await.is_ok()
    }
}

pub fn epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::FailStrategy;
    use crate::store::MemoryStore;
    use std::time::Duration;

    const MINUTE: Duration = Duration::from_secs(60);

    fn limiter() -> (Arc<MemoryStore>, RateLimiter) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), RateLimiter::new(store))
    }

    fn member_of(org: &str, user: &str) -> RequestIdentifiers {
        RequestIdentifiers {
            user_id: Some(user.to_string()),
            organization_id: Some(org.to_string()),
            ip_address: None,
        }
    }

    #[tokio::test]
    async fn organization_exhaustion_denies_every_member() {
        let (_, limiter) = limiter();
        let config = RateLimitConfig::new(FailStrategy::Open)
            .with_user(5, MINUTE)
            .with_organization(3, MINUTE);

        // Three different users spend the whole org budget.
        for user in ["u1", "u2", "u3"] {
            let result = limiter
                .check_rate_limit_at(&member_of("acme", user), "/api/generate", &config, 1_000)
                .await
                .unwrap();
            assert!(result.allowed);
        }

        // A fourth user has full personal budget but the org is dry.
        let denied = limiter
            .check_rate_limit_at(&member_of("acme", "u4"), "/api/generate", &config, 2_000)
            .await
            .unwrap();
        assert!(!denied.allowed);
        assert!(denied.user_result().unwrap().allowed);
        assert!(!denied.organization_result().unwrap().allowed);
        assert_eq!(
            denied.binding_denial().unwrap().kind,
            DimensionKind::Organization
        );
        assert!(denied.retry_after_secs.is_some());
    }

    #[tokio::test]
    async fn distinct_users_never_share_quota() {
        let (_, limiter) = limiter();
        let config = RateLimitConfig::new(FailStrategy::Open).with_user(1, MINUTE);

        let ids_a = RequestIdentifiers {
            user_id: Some("alice".to_string()),
            ..Default::default()
        };
        let ids_b = RequestIdentifiers {
            user_id: Some("bob".to_string()),
            ..Default::default()
        };

        let first = limiter
            .check_rate_limit_at(&ids_a, "/api/generate", &config, 1_000)
            .await
            .unwrap();
        assert!(first.allowed);

        let second = limiter
            .check_rate_limit_at(&ids_a, "/api/generate", &config, 1_500)
            .await
            .unwrap();
        assert!(!second.allowed);

        let other = limiter
            .check_rate_limit_at(&ids_b, "/api/generate", &config, 1_500)
            .await
            .unwrap();
        assert!(other.allowed);
    }

    #[tokio::test]
    async fn reset_uses_earliest_denied_boundary() {
        let (_, limiter) = limiter();
        let config = RateLimitConfig::new(FailStrategy::Open)
            .with_user(1, MINUTE)
            .with_organization(1, Duration::from_secs(30));

        limiter
            .check_rate_limit_at(&member_of("acme", "u1"), "/api/generate", &config, 0)
            .await
            .unwrap();

        let denied = limiter
            .check_rate_limit_at(&member_of("acme", "u1"), "/api/generate", &config, 5_000)
            .await
            .unwrap();
        assert!(!denied.allowed);
        // Both dimensions denied; the 30s org window resets first.
        assert_eq!(denied.reset_at_ms, 30_000);
        assert_eq!(denied.retry_after_secs, Some(25));
    }

    #[tokio::test]
    async fn missing_identifiers_skip_dimensions() {
        let (_, limiter) = limiter();
        let config = RateLimitConfig::new(FailStrategy::Open)
            .with_user(1, MINUTE)
            .with_ip(1, MINUTE);

        // No identifiers at all: nothing to meter.
        let result = limiter
            .check_rate_limit_at(
                &RequestIdentifiers::default(),
                "/api/generate",
                &config,
                1_000,
            )
            .await
            .unwrap();
        assert!(result.allowed);
        assert!(!result.is_metered());

        // Empty user id: only the ip dimension is checked.
        let ids = RequestIdentifiers {
            user_id: Some(String::new()),
            organization_id: None,
            ip_address: Some("10.0.0.1".to_string()),
        };
        let result = limiter
            .check_rate_limit_at(&ids, "/api/generate", &config, 1_000)
            .await
            .unwrap();
        assert_eq!(result.dimensions.len(), 1);
        assert_eq!(result.dimensions[0].kind, DimensionKind::Ip);
    }

    #[tokio::test]
    async fn fail_open_allows_during_outage() {
        let (store, limiter) = limiter();
        let config = RateLimitConfig::new(FailStrategy::Open).with_user(1, MINUTE);
        store.set_unavailable(true);

        let ids = RequestIdentifiers {
            user_id: Some("u1".to_string()),
            ..Default::default()
        };
        let result = limiter
            .check_rate_limit_at(&ids, "/api/generate", &config, 1_000)
            .await
            .unwrap();
        assert!(result.allowed);
        assert!(result.degraded);
    }

    #[tokio::test]
    async fn fail_closed_raises_unavailable_during_outage() {
        let (store, limiter) = limiter();
        let config = RateLimitConfig::new(FailStrategy::Closed).with_user(1, MINUTE);
        store.set_unavailable(true);

        let ids = RequestIdentifiers {
            user_id: Some("u1".to_string()),
            ..Default::default()
        };
        let err = limiter
            .check_rate_limit_at(&ids, "/api/generate", &config, 1_000)
            .await
            .unwrap_err();
        assert!(matches!(err, RateLimitError::EnforcementUnavailable));
    }

    #[tokio::test]
    async fn header_tie_break_prefers_user_dimension() {
        let (_, limiter) = limiter();
        let config = RateLimitConfig::new(FailStrategy::Open)
            .with_user(3, MINUTE)
            .with_organization(3, MINUTE);

        let result = limiter
            .check_rate_limit_at(&member_of("acme", "u1"), "/api/generate", &config, 1_000)
            .await
            .unwrap();
        assert_eq!(
            result.most_restrictive().unwrap().kind,
            DimensionKind::User
        );
    }
}
