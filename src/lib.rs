pub mod availability;
pub mod config;
pub mod dimensions;
pub mod error;
pub mod handlers;
pub mod headers;
pub mod keys;
pub mod limiter;
pub mod limits;
pub mod middleware;
pub mod response;
pub mod server;
pub mod store;
pub mod window;

pub use config::Config;
pub use dimensions::{DimensionKind, RequestIdentifiers};
pub use error::{RateLimitError, Result};
pub use limiter::{RateLimitCheckResult, RateLimiter};
pub use limits::{DimensionLimit, FailStrategy, LimitRegistry, RateLimitConfig};
pub use middleware::{rate_limit_middleware, RateLimitState};
pub use server::create_app;
pub use store::{CounterStore, MemoryStore, RedisStore};
pub use window::RateLimitResult;
