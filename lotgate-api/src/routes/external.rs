//! External Release Gateway Routes
//!
//! The only unauthenticated surface besides health. An external release
//! authority holds a bearer secret from an emailed link; GET previews the
//! checkpoint behind it, POST consumes it and releases the checkpoint.
//!
//! The secret travels in the path and is never logged: handlers pass it
//! straight to the token service, which reduces it to a digest before any
//! lookup or log line.

use crate::error::{ApiError, ApiResult};
use crate::services;
use crate::state::AppState;
use crate::types::{ExternalReleaseRequest, TokenPreviewResponse};
use axum::{
    extract::{Path, State},
    Json,
};
use lotgate_core::Checkpoint;
use std::sync::Arc;

/// GET /external/release/{secret} - Preview the checkpoint behind a link
#[utoipa::path(
    get,
    path = "/external/release/{secret}",
    tag = "External",
    params(("secret" = String, Path, description = "Bearer token secret")),
    responses(
        (status = 200, description = "Checkpoint context for the release decision", body = TokenPreviewResponse),
        (status = 404, description = "Unknown or superseded token", body = ApiError),
        (status = 410, description = "Token expired or already used", body = ApiError),
    )
)]
pub async fn preview_release(
    State(state): State<Arc<AppState>>,
    Path(secret): Path<String>,
) -> ApiResult<Json<TokenPreviewResponse>> {
    let preview = services::preview_token(&state.db, &secret).await?;
    Ok(Json(preview))
}

/// POST /external/release/{secret} - Consume the token and release
#[utoipa::path(
    post,
    path = "/external/release/{secret}",
    tag = "External",
    params(("secret" = String, Path, description = "Bearer token secret")),
    request_body = ExternalReleaseRequest,
    responses(
        (status = 200, description = "Checkpoint released", body = Checkpoint),
        (status = 404, description = "Unknown or superseded token", body = ApiError),
        (status = 409, description = "Token already consumed, or checkpoint no longer releasable", body = ApiError),
        (status = 410, description = "Token expired", body = ApiError),
    )
)]
pub async fn submit_release(
    State(state): State<Arc<AppState>>,
    Path(secret): Path<String>,
    Json(req): Json<ExternalReleaseRequest>,
) -> ApiResult<Json<Checkpoint>> {
    let checkpoint = services::consume_token(&state.db, &state.notifier, &secret, req).await?;
    Ok(Json(checkpoint))
}

/// Create the external gateway router.
pub fn create_router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route(
            "/external/release/:secret",
            axum::routing::get(preview_release).post(submit_release),
        )
        .with_state(state)
}
