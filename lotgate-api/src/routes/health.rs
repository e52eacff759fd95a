//! Health Check Routes
//!
//! Liveness (/health) answers as long as the process is up; readiness
//! (/ready) additionally round-trips the database pool.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::HealthResponse;
use axum::{extract::State, Json};
use std::sync::Arc;

/// GET /health - Liveness probe
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse),
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: "unchecked".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready - Readiness probe including a database round-trip
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = ApiError),
    )
)]
pub async fn ready(State(state): State<Arc<AppState>>) -> ApiResult<Json<HealthResponse>> {
    state
        .db
        .ping()
        .await
        .map_err(|e| ApiError::service_unavailable(format!("database not ready: {}", e.message)))?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: "ok".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    }))
}

/// Create the health routes router.
pub fn create_router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route("/health", axum::routing::get(health))
        .route("/ready", axum::routing::get(ready))
        .with_state(state)
}
