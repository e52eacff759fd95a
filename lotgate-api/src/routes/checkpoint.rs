//! Checkpoint (Hold Point) REST API Routes
//!
//! Notification, chasing, escalation, internal release/rejection, and
//! external token issuance. Every transition is re-asserted by the database
//! layer with a guarded conditional update; the handlers here do request
//! validation, authorization, and notification fan-out.

use crate::error::{ApiError, ApiResult};
use crate::events::{notify, NotificationEvent};
use crate::middleware::AuthExtractor;
use crate::services;
use crate::state::AppState;
use crate::types::{
    EscalateCheckpointRequest, IssueTokenRequest, IssueTokenResponse, ListCheckpointsResponse,
    RejectCheckpointRequest, ReleaseCheckpointRequest,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use lotgate_core::{Checkpoint, ReleaseAttribution, ReleaseMethod};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Query parameters for the stale-checkpoint scan.
#[derive(Debug, Deserialize)]
pub struct StaleQuery {
    /// Override the configured escalation-due threshold, in hours.
    pub older_than_hours: Option<i64>,
}

/// GET /api/v1/lots/{lot_id}/checkpoints - All checkpoints for a lot
#[utoipa::path(
    get,
    path = "/api/v1/lots/{lot_id}/checkpoints",
    tag = "Checkpoints",
    params(("lot_id" = Uuid, Path, description = "Lot ID")),
    responses(
        (status = 200, description = "Checkpoints for the lot", body = ListCheckpointsResponse),
        (status = 404, description = "Lot not found", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn list_checkpoints(
    State(state): State<Arc<AppState>>,
    AuthExtractor(auth): AuthExtractor,
    Path(lot_id): Path<Uuid>,
) -> ApiResult<Json<ListCheckpointsResponse>> {
    state.authorize_lot(&auth, lot_id).await?;
    let checkpoints = state.db.checkpoints_for_lot(lot_id).await?;
    let total = checkpoints.len() as i64;
    Ok(Json(ListCheckpointsResponse { checkpoints, total }))
}

/// GET /api/v1/checkpoints/stale - Notified checkpoints overdue for contact
#[utoipa::path(
    get,
    path = "/api/v1/checkpoints/stale",
    tag = "Checkpoints",
    params(("older_than_hours" = Option<i64>, Query, description = "Staleness threshold override")),
    responses(
        (status = 200, description = "Stale checkpoints", body = ListCheckpointsResponse),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn stale_checkpoints(
    State(state): State<Arc<AppState>>,
    AuthExtractor(_auth): AuthExtractor,
    Query(query): Query<StaleQuery>,
) -> ApiResult<Json<ListCheckpointsResponse>> {
    let threshold = match query.older_than_hours {
        Some(h) if h <= 0 => return Err(ApiError::invalid_range("older_than_hours", 1, i64::MAX)),
        Some(h) => chrono::Duration::hours(h),
        None => state.workflow.escalate_after,
    };
    let checkpoints = state.db.checkpoints_stale(threshold).await?;
    let total = checkpoints.len() as i64;
    Ok(Json(ListCheckpointsResponse { checkpoints, total }))
}

/// GET /api/v1/checkpoints/{id} - Get checkpoint by ID
#[utoipa::path(
    get,
    path = "/api/v1/checkpoints/{id}",
    tag = "Checkpoints",
    params(("id" = Uuid, Path, description = "Checkpoint ID")),
    responses(
        (status = 200, description = "Checkpoint details", body = Checkpoint),
        (status = 404, description = "Checkpoint not found", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn get_checkpoint(
    State(state): State<Arc<AppState>>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Checkpoint>> {
    let checkpoint = state.authorize_checkpoint(&auth, id).await?;
    Ok(Json(checkpoint))
}

/// POST /api/v1/checkpoints/{id}/notify - Notify the release authority
#[utoipa::path(
    post,
    path = "/api/v1/checkpoints/{id}/notify",
    tag = "Checkpoints",
    params(("id" = Uuid, Path, description = "Checkpoint ID")),
    responses(
        (status = 200, description = "Checkpoint notified (idempotent)", body = Checkpoint),
        (status = 404, description = "Checkpoint not found", body = ApiError),
        (status = 409, description = "Checkpoint is terminal", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn notify_checkpoint(
    State(state): State<Arc<AppState>>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Checkpoint>> {
    state.authorize_checkpoint(&auth, id).await?;
    let checkpoint = state.db.checkpoint_notify(id).await?;
    notify(
        &state.notifier,
        NotificationEvent::CheckpointAwaitingRelease {
            checkpoint_id: checkpoint.checkpoint_id,
            lot_id: checkpoint.lot_id,
            item_description: item_description(&state, &checkpoint).await,
        },
    );
    Ok(Json(checkpoint))
}

/// POST /api/v1/checkpoints/{id}/chase - Record a reminder
#[utoipa::path(
    post,
    path = "/api/v1/checkpoints/{id}/chase",
    tag = "Checkpoints",
    params(("id" = Uuid, Path, description = "Checkpoint ID")),
    responses(
        (status = 200, description = "Chase recorded", body = Checkpoint),
        (status = 404, description = "Checkpoint not found", body = ApiError),
        (status = 409, description = "Checkpoint is not notified", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn chase_checkpoint(
    State(state): State<Arc<AppState>>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Checkpoint>> {
    state.authorize_checkpoint(&auth, id).await?;
    let checkpoint = state.db.checkpoint_chase(id).await?;
    notify(
        &state.notifier,
        NotificationEvent::CheckpointChased {
            checkpoint_id: checkpoint.checkpoint_id,
            lot_id: checkpoint.lot_id,
            chase_count: checkpoint.chase_count,
        },
    );
    Ok(Json(checkpoint))
}

/// POST /api/v1/checkpoints/{id}/escalate - Escalate an unanswered checkpoint
#[utoipa::path(
    post,
    path = "/api/v1/checkpoints/{id}/escalate",
    tag = "Checkpoints",
    params(("id" = Uuid, Path, description = "Checkpoint ID")),
    request_body = EscalateCheckpointRequest,
    responses(
        (status = 200, description = "Checkpoint escalated", body = Checkpoint),
        (status = 404, description = "Checkpoint not found", body = ApiError),
        (status = 409, description = "Already escalated or terminal", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn escalate_checkpoint(
    State(state): State<Arc<AppState>>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<Uuid>,
    Json(req): Json<EscalateCheckpointRequest>,
) -> ApiResult<Json<Checkpoint>> {
    if req.escalated_to.is_empty() {
        return Err(ApiError::missing_field("escalated_to"));
    }
    if req.reason.trim().is_empty() {
        return Err(ApiError::missing_field("reason"));
    }
    // Run the pure guard for its error messages, then let the conditional
    // UPDATE re-assert it against current state.
    let mut checkpoint = state.authorize_checkpoint(&auth, id).await?;
    checkpoint.escalate(
        req.escalated_by.clone(),
        req.escalated_to.clone(),
        req.reason.clone(),
        chrono::Utc::now(),
    )?;
    let escalation = serde_json::to_value(
        checkpoint
            .escalation
            .as_ref()
            .ok_or_else(|| ApiError::internal_error("escalation guard produced no record"))?,
    )?;

    let updated = state.db.checkpoint_escalate(id, &escalation).await?;
    notify(
        &state.notifier,
        NotificationEvent::CheckpointEscalated {
            checkpoint_id: updated.checkpoint_id,
            lot_id: updated.lot_id,
            escalated_to: req.escalated_to,
            reason: req.reason,
        },
    );
    Ok(Json(updated))
}

/// POST /api/v1/checkpoints/{id}/escalation/resolve - Resolve the escalation
#[utoipa::path(
    post,
    path = "/api/v1/checkpoints/{id}/escalation/resolve",
    tag = "Checkpoints",
    params(("id" = Uuid, Path, description = "Checkpoint ID")),
    responses(
        (status = 200, description = "Escalation resolved", body = Checkpoint),
        (status = 404, description = "Checkpoint not found", body = ApiError),
        (status = 409, description = "No unresolved escalation", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn resolve_escalation(
    State(state): State<Arc<AppState>>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Checkpoint>> {
    state.authorize_checkpoint(&auth, id).await?;
    let checkpoint = state.db.checkpoint_resolve_escalation(id).await?;
    Ok(Json(checkpoint))
}

/// POST /api/v1/checkpoints/{id}/release - Internal release on behalf of an authority
#[utoipa::path(
    post,
    path = "/api/v1/checkpoints/{id}/release",
    tag = "Checkpoints",
    params(("id" = Uuid, Path, description = "Checkpoint ID")),
    request_body = ReleaseCheckpointRequest,
    responses(
        (status = 200, description = "Checkpoint released", body = Checkpoint),
        (status = 404, description = "Checkpoint not found", body = ApiError),
        (status = 409, description = "Checkpoint is not notified", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn release_checkpoint(
    State(state): State<Arc<AppState>>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<Uuid>,
    Json(req): Json<ReleaseCheckpointRequest>,
) -> ApiResult<Json<Checkpoint>> {
    if req.released_by_name.trim().is_empty() {
        return Err(ApiError::missing_field("released_by_name"));
    }
    state.authorize_checkpoint(&auth, id).await?;

    let attribution = ReleaseAttribution {
        released_by_name: req.released_by_name,
        released_by_org: req.released_by_org,
        release_notes: req.release_notes,
        release_method: ReleaseMethod::Internal,
    };
    let checkpoint = state.db.checkpoint_release(id, &attribution).await?;
    notify(
        &state.notifier,
        NotificationEvent::CheckpointReleased {
            checkpoint_id: checkpoint.checkpoint_id,
            lot_id: checkpoint.lot_id,
            released_by: attribution.released_by_name.clone(),
        },
    );
    Ok(Json(checkpoint))
}

/// POST /api/v1/checkpoints/{id}/reject - Reject the inspected work
#[utoipa::path(
    post,
    path = "/api/v1/checkpoints/{id}/reject",
    tag = "Checkpoints",
    params(("id" = Uuid, Path, description = "Checkpoint ID")),
    request_body = RejectCheckpointRequest,
    responses(
        (status = 200, description = "Checkpoint rejected", body = Checkpoint),
        (status = 404, description = "Checkpoint not found", body = ApiError),
        (status = 409, description = "Checkpoint is not notified", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn reject_checkpoint(
    State(state): State<Arc<AppState>>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectCheckpointRequest>,
) -> ApiResult<Json<Checkpoint>> {
    if req.reason.trim().is_empty() {
        return Err(ApiError::missing_field("reason"));
    }
    state.authorize_checkpoint(&auth, id).await?;
    let checkpoint = state.db.checkpoint_reject(id, &req.reason).await?;
    notify(
        &state.notifier,
        NotificationEvent::CheckpointRejected {
            checkpoint_id: checkpoint.checkpoint_id,
            lot_id: checkpoint.lot_id,
            reason: req.reason,
        },
    );
    Ok(Json(checkpoint))
}

/// POST /api/v1/checkpoints/{id}/tokens - Issue an external release token
#[utoipa::path(
    post,
    path = "/api/v1/checkpoints/{id}/tokens",
    tag = "Checkpoints",
    params(("id" = Uuid, Path, description = "Checkpoint ID")),
    request_body = IssueTokenRequest,
    responses(
        (status = 201, description = "Token issued; the secret appears only here", body = IssueTokenResponse),
        (status = 404, description = "Checkpoint not found", body = ApiError),
        (status = 409, description = "Checkpoint is not notified", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<Uuid>,
    Json(req): Json<IssueTokenRequest>,
) -> ApiResult<impl IntoResponse> {
    state.authorize_checkpoint(&auth, id).await?;
    let response =
        services::issue_token(&state.db, &state.notifier, id, req, state.workflow.token_ttl)
            .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Best-effort item description for notification payloads. The checkpoint
/// stays valid even when the snapshot lookup fails.
async fn item_description(state: &AppState, checkpoint: &Checkpoint) -> String {
    let instance = match state.db.instance_get_by_lot(checkpoint.lot_id).await {
        Ok(Some(instance)) => instance,
        _ => return String::new(),
    };
    match services::instance_checklist(&state.db, &instance).await {
        Ok((items, _)) => items
            .into_iter()
            .find(|i| i.item_id == checkpoint.item_id)
            .map(|i| i.description)
            .unwrap_or_default(),
        Err(_) => String::new(),
    }
}

/// Create the checkpoint routes router.
pub fn create_router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route(
            "/api/v1/lots/:lot_id/checkpoints",
            axum::routing::get(list_checkpoints),
        )
        .route(
            "/api/v1/checkpoints/stale",
            axum::routing::get(stale_checkpoints),
        )
        .route("/api/v1/checkpoints/:id", axum::routing::get(get_checkpoint))
        .route(
            "/api/v1/checkpoints/:id/notify",
            axum::routing::post(notify_checkpoint),
        )
        .route(
            "/api/v1/checkpoints/:id/chase",
            axum::routing::post(chase_checkpoint),
        )
        .route(
            "/api/v1/checkpoints/:id/escalate",
            axum::routing::post(escalate_checkpoint),
        )
        .route(
            "/api/v1/checkpoints/:id/escalation/resolve",
            axum::routing::post(resolve_escalation),
        )
        .route(
            "/api/v1/checkpoints/:id/release",
            axum::routing::post(release_checkpoint),
        )
        .route(
            "/api/v1/checkpoints/:id/reject",
            axum::routing::post(reject_checkpoint),
        )
        .route(
            "/api/v1/checkpoints/:id/tokens",
            axum::routing::post(issue_token),
        )
        .with_state(state)
}
