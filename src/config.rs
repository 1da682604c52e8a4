use anyhow::Context;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration, loaded from the environment (after `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (`BIND_ADDR`).
    pub bind_address: SocketAddr,
    /// Counting store URL (`REDIS_URL`). Empty means in-process counting.
    pub redis_url: String,
    /// Optional JSON limit registry (`LIMITS_FILE`); built-in limits
    /// apply when unset.
    pub limits_file: Option<PathBuf>,
    /// Upper bound on one store round trip (`STORE_TIMEOUT_MS`). A check
    /// exceeding this is treated as a store outage.
    pub store_timeout: Duration,
    /// Default log level (`LOG_LEVEL`) when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_address = env_or("BIND_ADDR", "127.0.0.1:3000")
            .parse()
            .context("invalid BIND_ADDR")?;

        let store_timeout_ms: u64 = env_or("STORE_TIMEOUT_MS", "500")
            .parse()
            .context("invalid STORE_TIMEOUT_MS")?;

        Ok(Self {
            bind_address,
            redis_url: env_or("REDIS_URL", ""),
            limits_file: std::env::var("LIMITS_FILE").ok().map(PathBuf::from),
            store_timeout: Duration::from_millis(store_timeout_ms),
            log_level: env_or("LOG_LEVEL", "info"),
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
