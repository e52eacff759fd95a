//! Inspection Instance REST API Routes
//!
//! A lot has at most one instance, so the instance is addressed through
//! its lot rather than by its own id.

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthExtractor;
use crate::services;
use crate::state::AppState;
use crate::types::{
    CreateInstanceRequest, InstanceProgressResponse, RecordCompletionRequest,
    RecordCompletionResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Query parameters for the progress view.
#[derive(Debug, Deserialize)]
pub struct InstanceQuery {
    /// Restrict the checklist to one responsible party.
    pub party: Option<String>,
}

/// POST /api/v1/lots/{lot_id}/instance - Instantiate a template
#[utoipa::path(
    post,
    path = "/api/v1/lots/{lot_id}/instance",
    tag = "Instances",
    params(("lot_id" = Uuid, Path, description = "Lot ID")),
    request_body = CreateInstanceRequest,
    responses(
        (status = 201, description = "Instance created with frozen snapshot", body = InstanceProgressResponse),
        (status = 404, description = "Lot or template not found", body = ApiError),
        (status = 409, description = "Lot already has an instance", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn create_instance(
    State(state): State<Arc<AppState>>,
    AuthExtractor(auth): AuthExtractor,
    Path(lot_id): Path<Uuid>,
    Json(req): Json<CreateInstanceRequest>,
) -> ApiResult<impl IntoResponse> {
    state.authorize_lot(&auth, lot_id).await?;
    let instance = services::create_instance(&state.db, lot_id, req.template_id).await?;
    let progress = services::instance_progress(&state.db, instance).await?;
    Ok((StatusCode::CREATED, Json(progress)))
}

/// GET /api/v1/lots/{lot_id}/instance - Checklist progress view
#[utoipa::path(
    get,
    path = "/api/v1/lots/{lot_id}/instance",
    tag = "Instances",
    params(
        ("lot_id" = Uuid, Path, description = "Lot ID"),
        ("party" = Option<String>, Query, description = "Restrict to one responsible party"),
    ),
    responses(
        (status = 200, description = "Instance progress", body = InstanceProgressResponse),
        (status = 404, description = "Lot has no instance", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn get_instance(
    State(state): State<Arc<AppState>>,
    AuthExtractor(auth): AuthExtractor,
    Path(lot_id): Path<Uuid>,
    Query(query): Query<InstanceQuery>,
) -> ApiResult<Json<InstanceProgressResponse>> {
    state.authorize_lot(&auth, lot_id).await?;
    let instance = state
        .db
        .instance_get_by_lot(lot_id)
        .await?
        .ok_or_else(|| ApiError::instance_not_found(lot_id))?;
    let mut progress = services::instance_progress(&state.db, instance).await?;
    if let Some(party) = query.party {
        progress
            .items
            .retain(|i| i.responsible_party.eq_ignore_ascii_case(&party));
    }
    Ok(Json(progress))
}

/// POST /api/v1/lots/{lot_id}/instance/completions - Record a completion
#[utoipa::path(
    post,
    path = "/api/v1/lots/{lot_id}/instance/completions",
    tag = "Instances",
    params(("lot_id" = Uuid, Path, description = "Lot ID")),
    request_body = RecordCompletionRequest,
    responses(
        (status = 200, description = "Completion recorded", body = RecordCompletionResponse),
        (status = 400, description = "Item not on checklist or missing evidence", body = ApiError),
        (status = 404, description = "Lot has no instance", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn record_completion(
    State(state): State<Arc<AppState>>,
    AuthExtractor(auth): AuthExtractor,
    Path(lot_id): Path<Uuid>,
    Json(req): Json<RecordCompletionRequest>,
) -> ApiResult<Json<RecordCompletionResponse>> {
    state.authorize_lot(&auth, lot_id).await?;
    let instance = state
        .db
        .instance_get_by_lot(lot_id)
        .await?
        .ok_or_else(|| ApiError::instance_not_found(lot_id))?;
    let response = services::record_completion(&state.db, &instance, req).await?;
    Ok(Json(response))
}

/// Create the instance routes router.
pub fn create_router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route(
            "/api/v1/lots/:lot_id/instance",
            axum::routing::post(create_instance).get(get_instance),
        )
        .route(
            "/api/v1/lots/:lot_id/instance/completions",
            axum::routing::post(record_completion),
        )
        .with_state(state)
}
