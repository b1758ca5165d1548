//! HTTP status endpoint.
//!
//! Serves `GET /health` (liveness, 200/503) and `GET /status` (JSON
//! snapshot of listener/dispatcher counters) on `global.status`.
//!
//! The overall health is the worst status among components: a signaled
//! shutdown is Unhealthy, a nearly-full dispatch buffer is Degraded.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use signpost_core::config::StatusConfig;
use signpost_core::pipeline::HealthStatus;
use signpost_router::dispatch::{DispatchSnapshot, Dispatcher};
use signpost_router::listener::{ListenerSnapshot, ListenerStats};
use signpost_router::rule::RuleSet;

/// Shared state backing the status endpoint.
pub struct AppState {
    started: Instant,
    ruleset: Arc<RuleSet>,
    listener_stats: Arc<ListenerStats>,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
}

impl AppState {
    /// Build the shared state.
    pub fn new(
        ruleset: Arc<RuleSet>,
        listener_stats: Arc<ListenerStats>,
        dispatcher: Dispatcher,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            started: Instant::now(),
            ruleset,
            listener_stats,
            dispatcher,
            cancel,
        })
    }

    /// Worst-of health across components.
    pub fn overall_health(&self) -> HealthStatus {
        if self.cancel.is_cancelled() {
            return HealthStatus::Unhealthy("shutdown in progress".to_owned());
        }
        self.dispatcher.health_check()
    }

    /// Full status snapshot served on `/status`.
    pub fn snapshot(&self) -> StatusBody {
        StatusBody {
            status: self.overall_health(),
            uptime_secs: self.started.elapsed().as_secs(),
            rules: self.ruleset.rule_count(),
            default_topic: self.ruleset.default_topic().to_owned(),
            listener: self.listener_stats.snapshot(),
            dispatch: self.dispatcher.stats().snapshot(),
            queue_depth: self.dispatcher.queue_depth(),
            queue_capacity: self.dispatcher.capacity(),
        }
    }
}

/// JSON body served on `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusBody {
    /// Overall daemon health.
    pub status: HealthStatus,
    /// Seconds since daemon start.
    pub uptime_secs: u64,
    /// Number of compiled rules.
    pub rules: usize,
    /// Default destination topic.
    pub default_topic: String,
    /// Listener counters.
    pub listener: ListenerSnapshot,
    /// Dispatcher counters.
    pub dispatch: DispatchSnapshot,
    /// Envelopes currently held by the dispatcher.
    pub queue_depth: usize,
    /// Configured dispatch buffer capacity.
    pub queue_capacity: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.overall_health();
    let code = if status.is_unhealthy() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(serde_json::json!({ "status": status })))
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusBody> {
    Json(state.snapshot())
}

/// Build the status router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status_handler))
        .with_state(state)
}

/// Bind and serve the status endpoint until shutdown is signaled.
pub async fn serve(
    config: StatusConfig,
    state: Arc<AppState>,
    cancel: CancellationToken,
) -> Result<()> {
    let bind_addr = format!("{}:{}", config.address, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind status endpoint to {bind_addr}: {e}"))?;

    tracing::info!(bind_addr = %bind_addr, "status endpoint listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    tracing::info!("status endpoint stopped");
    Ok(())
}
