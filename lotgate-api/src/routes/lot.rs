//! Lot (Work Unit) REST API Routes
//!
//! Lot registration and the derived-status view. The status field returned
//! here is never set by a client: it is computed by the synchronizer from
//! open issues and checkpoints, and the response includes both counts so a
//! caller can see why the lot reads as blocked.

use crate::auth::validate_project_access;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthExtractor;
use crate::state::AppState;
use crate::types::{CreateLotRequest, LotStatusResponse};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use lotgate_core::LotStatus;
use std::sync::Arc;
use uuid::Uuid;

/// POST /api/v1/lots - Register a lot
#[utoipa::path(
    post,
    path = "/api/v1/lots",
    tag = "Lots",
    request_body = CreateLotRequest,
    responses(
        (status = 201, description = "Lot registered", body = LotStatusResponse),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 403, description = "Not a project member", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn create_lot(
    State(state): State<Arc<AppState>>,
    AuthExtractor(auth): AuthExtractor,
    Json(req): Json<CreateLotRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.name.trim().is_empty() {
        return Err(ApiError::missing_field("name"));
    }
    validate_project_access(&state.access, &auth, req.project_id).await?;

    let lot = state
        .db
        .lot_create(req.project_id, &req.name, LotStatus::NotStarted)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(LotStatusResponse {
            lot,
            open_issues: 0,
            open_checkpoints: 0,
        }),
    ))
}

/// GET /api/v1/lots/{id} - Lot with derived status context
#[utoipa::path(
    get,
    path = "/api/v1/lots/{id}",
    tag = "Lots",
    params(("id" = Uuid, Path, description = "Lot ID")),
    responses(
        (status = 200, description = "Lot details", body = LotStatusResponse),
        (status = 404, description = "Lot not found", body = ApiError),
        (status = 403, description = "Not a project member", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn get_lot(
    State(state): State<Arc<AppState>>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<LotStatusResponse>> {
    let lot = state.authorize_lot(&auth, id).await?;
    let (open_issues, open_checkpoints) = state.db.lot_open_counts(id).await?;
    Ok(Json(LotStatusResponse {
        lot,
        open_issues,
        open_checkpoints,
    }))
}

/// Create the lot routes router.
pub fn create_router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route("/api/v1/lots", axum::routing::post(create_lot))
        .route("/api/v1/lots/:id", axum::routing::get(get_lot))
        .with_state(state)
}
