use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::handlers::{check_rate_limit, health_check, readiness_check};
use crate::limiter::RateLimiter;
use crate::limits::LimitRegistry;
use crate::middleware::RateLimitState;
use crate::store::{CounterStore, MemoryStore, RedisStore};

/// Assemble the service router over shared state.
pub fn create_app(state: RateLimitState) -> Router {
    Router::new()
        .route("/check", post(check_rate_limit))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

pub struct Server {
    app: Router,
    config: Config,
}

impl Server {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn CounterStore> = if config.redis_url.is_empty() {
            tracing::warn!(
                "REDIS_URL not set, counting in process memory; limits will not be shared across instances"
            );
            Arc::new(MemoryStore::new())
        } else {
            tracing::info!(redis_url = %config.redis_url, "connecting to counting store");
            Arc::new(RedisStore::connect(&config.redis_url, config.store_timeout).await?)
        };

        let registry = match &config.limits_file {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading limit registry");
                LimitRegistry::from_json_file(path)?
            }
            None => LimitRegistry::builtin(),
        };

        let state = RateLimitState::new(
            Arc::new(RateLimiter::new(store)),
            Arc::new(registry),
        );

        Ok(Self {
            app: create_app(state),
            config,
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_address).await?;

        tracing::info!("quotagate listening on {}", self.config.bind_address);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("received terminate signal, initiating graceful shutdown");
        },
    }
}
