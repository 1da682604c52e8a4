//! Per-endpoint rate limit configuration and the endpoint registry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::dimensions::DimensionKind;
use crate::error::{RateLimitError, Result};

/// Limit and window for a single dimension.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DimensionLimit {
    pub limit: u64,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

/// Degradation policy applied when the counting store is unreachable.
///
/// Fail-open protects availability for latency-sensitive endpoints at the
/// cost of quota enforcement; fail-closed protects cost-sensitive endpoints
/// (those calling a paid LLM) at the cost of availability. The choice is
/// per-endpoint, never global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailStrategy {
    Open,
    Closed,
}

/// Rate limits for one endpoint. Immutable once resolved for a request.
/// An absent dimension is never checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub user: Option<DimensionLimit>,
    #[serde(default)]
    pub organization: Option<DimensionLimit>,
    #[serde(default)]
    pub ip: Option<DimensionLimit>,
    pub fail_strategy: FailStrategy,
}

impl RateLimitConfig {
    pub fn new(fail_strategy: FailStrategy) -> Self {
        Self {
            user: None,
            organization: None,
            ip: None,
            fail_strategy,
        }
    }

    pub fn with_user(mut self, limit: u64, window: Duration) -> Self {
        self.user = Some(DimensionLimit { limit, window });
        self
    }

    pub fn with_organization(mut self, limit: u64, window: Duration) -> Self {
        self.organization = Some(DimensionLimit { limit, window });
        self
    }

    pub fn with_ip(mut self, limit: u64, window: Duration) -> Self {
        self.ip = Some(DimensionLimit { limit, window });
        self
    }

    /// The configured limit for a dimension, if any.
    pub fn limit_for(&self, kind: DimensionKind) -> Option<DimensionLimit> {
        match kind {
            DimensionKind::User => self.user,
            DimensionKind::Organization => self.organization,
            DimensionKind::Ip => self.ip,
        }
    }

    /// Largest configured window, used as a conservative reset guess when
    /// failing open.
    pub fn largest_window(&self) -> Option<Duration> {
        DimensionKind::PRIORITY
            .iter()
            .filter_map(|&kind| self.limit_for(kind))
            .map(|d| d.window)
            .max()
    }

    /// A config with no dimension limits is meaningless: rather than
    /// inventing a default window, it is rejected at load time.
    pub fn validate(&self) -> Result<()> {
        if self.user.is_none() && self.organization.is_none() && self.ip.is_none() {
            return Err(RateLimitError::Config(
                "at least one dimension limit (user, organization, ip) is required".to_string(),
            ));
        }
        for kind in DimensionKind::PRIORITY {
            if let Some(dim) = self.limit_for(kind) {
                if dim.window.as_millis() == 0 {
                    return Err(RateLimitError::Config(format!(
                        "{} window must be greater than zero",
                        kind.as_str()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Pure endpoint-to-config lookup. An endpoint with no entry is unmetered:
/// requests to it are allowed unconditionally and carry no rate headers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitRegistry {
    pub endpoints: HashMap<String, RateLimitConfig>,
}

impl LimitRegistry {
    pub fn new(endpoints: HashMap<String, RateLimitConfig>) -> Result<Self> {
        for (endpoint, config) in &endpoints {
            config
                .validate()
                .map_err(|e| RateLimitError::Config(format!("endpoint {endpoint}: {e}")))?;
        }
        Ok(Self { endpoints })
    }

    /// Load a registry from a JSON file. Windows use humantime strings
    /// ("30s", "1m", "1h").
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RateLimitError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let registry: LimitRegistry = serde_json::from_str(&raw).map_err(|e| {
            RateLimitError::Config(format!("failed to parse {}: {e}", path.display()))
        })?;
        Self::new(registry.endpoints)
    }

    /// Built-in limits for the dashboard's endpoints. LLM-calling endpoints
    /// fail closed (blocking beats an unmetered paid API); auth endpoints
    /// fail open (a login outage hurts more than a brute-force window).
    pub fn builtin() -> Self {
        let minute = Duration::from_secs(60);
        let hour = Duration::from_secs(3600);

        let mut endpoints = HashMap::new();
        endpoints.insert(
            "/api/generate".to_string(),
            RateLimitConfig::new(FailStrategy::Closed)
                .with_user(10, minute)
                .with_organization(100, minute)
                .with_ip(30, minute),
        );
        endpoints.insert(
            "/api/auth/login".to_string(),
            RateLimitConfig::new(FailStrategy::Open).with_ip(5, minute),
        );
        endpoints.insert(
            "/api/auth/signup".to_string(),
            RateLimitConfig::new(FailStrategy::Open).with_ip(10, hour),
        );

        Self { endpoints }
    }

    pub fn get(&self, endpoint: &str) -> Option<&RateLimitConfig> {
        self.endpoints.get(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_humantime_windows_from_json() {
        let raw = r#"{
            "endpoints": {
                "/api/generate": {
                    "user": { "limit": 10, "window": "1m" },
                    "organization": { "limit": 100, "window": "1m" },
                    "fail_strategy": "closed"
                }
            }
        }"#;

        let registry: LimitRegistry = serde_json::from_str(raw).unwrap();
        let config = registry.get("/api/generate").unwrap();
        assert_eq!(config.user.unwrap().limit, 10);
        assert_eq!(config.user.unwrap().window, Duration::from_secs(60));
        assert_eq!(config.fail_strategy, FailStrategy::Closed);
        assert!(config.ip.is_none());
    }

    #[test]
    fn config_without_dimensions_is_rejected() {
        let config = RateLimitConfig::new(FailStrategy::Open);
        assert!(config.validate().is_err());

        let mut endpoints = HashMap::new();
        endpoints.insert("/api/empty".to_string(), config);
        assert!(LimitRegistry::new(endpoints).is_err());
    }

    #[test]
    fn zero_window_is_rejected() {
        let config =
            RateLimitConfig::new(FailStrategy::Open).with_user(5, Duration::from_secs(0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn largest_window_spans_dimensions() {
        let config = RateLimitConfig::new(FailStrategy::Open)
            .with_user(10, Duration::from_secs(60))
            .with_ip(100, Duration::from_secs(3600));
        assert_eq!(config.largest_window(), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn unknown_endpoint_is_unmetered() {
        let registry = LimitRegistry::builtin();
        assert!(registry.get("/api/unmetered").is_none());
        assert!(registry.get("/api/generate").is_some());
    }
}
