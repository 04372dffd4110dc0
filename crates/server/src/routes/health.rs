//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// State of the breaker in front of the accrual service.
    pub accrual_circuit: String,
}

/// GET /health: the process is up. Also reports whether accrual lookups are
/// currently being short-circuited.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        accrual_circuit: state.breaker.state().to_string(),
    })
}
