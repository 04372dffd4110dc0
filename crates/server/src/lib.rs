//! Loyalty ledger process.
//!
//! Wires the PostgreSQL ledger, the accrual gateway and the reconciliation
//! worker together, and exposes health and Prometheus metrics endpoints.

pub mod config;
pub mod error;
pub mod routes;
pub mod telemetry;

use std::sync::Arc;

use accrual::CircuitBreaker;
use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

pub use config::{Config, Flags, LogFormat};
pub use error::{Result, ServerError};

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub breaker: CircuitBreaker,
}

impl AppState {
    pub fn new(breaker: CircuitBreaker) -> Self {
        Self { breaker }
    }
}

/// Creates the Axum application router.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .with_state(state)
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}
