//! HTTP surface of Taskhive.
//!
//! - `GET  /workers?action=stats` - snapshot of listeners, workers and waiting tasks
//! - `GET  /workers?entity=tasks&page=1&per_page=20&sort=priority&order=desc` - paginated view
//! - `POST /workers?action=<command>` - control command, form-encoded `id`, `count`, `events`
//! - `GET  /health` - dispatcher liveness and counts
//! - `GET  /metrics` - Prometheus exposition
//!
//! Errors are rendered through [`HiveError`](crate::error::HiveError)'s
//! `IntoResponse`, so every failure carries the structured error payload.

mod handlers;

use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::control::ControlApi;
use crate::orchestrator::Dispatcher;
use crate::telemetry::MetricsRegistry;

pub use handlers::{ActionQuery, WorkersQuery};

/// Application state shared across handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub control: ControlApi,
    pub metrics: MetricsRegistry,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>, metrics: MetricsRegistry) -> Self {
        Self {
            control: ControlApi::new(dispatcher),
            metrics,
            started_at: Instant::now(),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        self.control.dispatcher()
    }
}

/// Build the API router.
///
/// # Example
///
/// ```rust,ignore
/// let state = AppState::new(dispatcher, telemetry.metrics);
/// let app = build_router(state);
/// ```
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/workers",
            get(handlers::workers_view).post(handlers::workers_control),
        )
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
