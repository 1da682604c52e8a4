//! Shared counting store backends.
//!
//! The sliding-window check is four store operations (purge expired
//! entries, count live entries, insert the current attempt, refresh the key
//! TTL) that must execute as one atomic unit against the same key. Safety
//! across concurrent callers and across server instances comes from the
//! store's atomicity, not from application-level locking, which is why the
//! store is an injected dependency rather than in-process counters.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

use crate::error::{RateLimitError, Result};

/// Grace period added to each key's TTL beyond the window, so abandoned
/// keys are physically removed even if never checked again.
pub const EXPIRY_GRACE_SECS: u64 = 60;

/// What the atomic unit observed for one key.
#[derive(Debug, Clone, Copy)]
pub struct WindowSnapshot {
    /// Live entries in the window before the current attempt was inserted.
    pub count_before: u64,
    /// Score of the oldest live entry after insertion. Equals `now_ms`
    /// when the window was empty.
    pub oldest_live_ms: i64,
}

/// A store capable of running the purge/count/insert/expire unit atomically
/// for one key. Any I/O error propagates to the caller; the availability
/// policy decides the outcome.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Run the atomic unit: expire entries at or before `now_ms - window`,
    /// count the survivors, register the current attempt at `now_ms`, and
    /// refresh the key's TTL to `window + EXPIRY_GRACE_SECS`.
    async fn record_and_count(
        &self,
        key: &str,
        window: Duration,
        now_ms: i64,
    ) -> Result<WindowSnapshot>;

    /// Lightweight reachability probe.
    async fn ping(&self) -> Result<()>;
}

/// Entries with a score at or before the cutoff are expired: only scores
/// strictly inside the trailing window count, so a request exactly
/// `window` old no longer does. The set is never empty after ZADD, so the
/// oldest score always exists.
const WINDOW_SCRIPT: &str = r#"
local now = tonumber(ARGV[1])
local cutoff = now - tonumber(ARGV[2])
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', cutoff)
local count = redis.call('ZCARD', KEYS[1])
redis.call('ZADD', KEYS[1], now, ARGV[3])
redis.call('EXPIRE', KEYS[1], tonumber(ARGV[4]))
local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
return {count, tonumber(oldest[2])}
"#;

/// Redis-backed store shared by every server instance.
///
/// `ConnectionManager` reconnects with backoff after failures; a check that
/// cannot complete within `call_timeout` is treated identically to an
/// unreachable store.
pub struct RedisStore {
    connection: ConnectionManager,
    script: Script,
    call_timeout: Duration,
}

impl RedisStore {
    pub async fn connect(redis_url: &str, call_timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection,
            script: Script::new(WINDOW_SCRIPT),
            call_timeout,
        })
    }

    async fn bounded<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        timeout(self.call_timeout, fut)
            .await
            .map_err(|_| RateLimitError::StoreUnavailable("counting store timed out".to_string()))?
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn record_and_count(
        &self,
        key: &str,
        window: Duration,
        now_ms: i64,
    ) -> Result<WindowSnapshot> {
        let member = format!("{}-{}", now_ms, Uuid::new_v4());
        let window_ms = window.as_millis() as i64;
        let ttl_secs = window.as_secs() + EXPIRY_GRACE_SECS;
        let mut conn = self.connection.clone();

        let mut invocation = self.script.prepare_invoke();
        invocation
            .key(key)
            .arg(now_ms)
            .arg(window_ms)
            .arg(member.as_str())
            .arg(ttl_secs);

        let (count_before, oldest_live_ms): (u64, i64) = self
            .bounded(async {
                invocation
                    .invoke_async(&mut conn)
                    .await
                    .map_err(RateLimitError::from)
            })
            .await?;

        Ok(WindowSnapshot {
            count_before,
            oldest_live_ms,
        })
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        self.bounded(async {
            let _: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(RateLimitError::from)?;
            Ok(())
        })
        .await
    }
}

struct MemoryWindow {
    scores: Vec<i64>,
    expires_at_ms: i64,
}

/// Single-process store used when no `REDIS_URL` is configured, and as the
/// test double for the availability policy. Faithful to the Redis unit: the
/// map mutex is held for the whole purge/count/insert/expire sequence, so
/// two concurrent callers never observe the same count before insertion.
#[derive(Default)]
pub struct MemoryStore {
    windows: Mutex<HashMap<String, MemoryWindow>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a store outage; subsequent calls fail until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RateLimitError::StoreUnavailable(
                "memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn record_and_count(
        &self,
        key: &str,
        window: Duration,
        now_ms: i64,
    ) -> Result<WindowSnapshot> {
        self.check_available()?;

        let window_ms = window.as_millis() as i64;
        let mut windows = self.windows.lock().map_err(|_| {
            RateLimitError::StoreUnavailable("memory store lock poisoned".to_string())
        })?;

        // Honor the key TTL the same way an untouched Redis key would expire.
        if windows
            .get(key)
            .is_some_and(|w| now_ms >= w.expires_at_ms)
        {
            windows.remove(key);
        }

        let entry = windows.entry(key.to_string()).or_insert(MemoryWindow {
            scores: Vec::new(),
            expires_at_ms: 0,
        });

        let cutoff = now_ms - window_ms;
        entry.scores.retain(|&score| score > cutoff);

        let count_before = entry.scores.len() as u64;
        entry.scores.push(now_ms);
        entry.expires_at_ms = now_ms + window_ms + (EXPIRY_GRACE_SECS as i64) * 1000;

        let oldest_live_ms = entry.scores.iter().copied().min().unwrap_or(now_ms);

        Ok(WindowSnapshot {
            count_before,
            oldest_live_ms,
        })
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }
}
