//! Non-Conformance Issue REST API Routes
//!
//! The issue lifecycle: raise, respond, review, rectify, close. Transitions
//! delegate to the issue service, which applies the pure state machine and
//! persists with a write conditioned on the state that was reviewed.

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthExtractor;
use crate::services;
use crate::state::AppState;
use crate::types::{
    CloseIssueRequest, ListIssuesResponse, RaiseIssueRequest, RectifyIssueRequest,
    RectifyIssueResponse, RespondIssueRequest, ReviewIssueRequest,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use lotgate_core::{Issue, IssueStatus};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Query parameters for listing issues.
#[derive(Debug, Deserialize)]
pub struct ListIssuesQuery {
    pub status: Option<IssueStatus>,
}

/// POST /api/v1/lots/{lot_id}/issues - Raise a non-conformance issue
#[utoipa::path(
    post,
    path = "/api/v1/lots/{lot_id}/issues",
    tag = "Issues",
    params(("lot_id" = Uuid, Path, description = "Lot ID")),
    request_body = RaiseIssueRequest,
    responses(
        (status = 201, description = "Issue raised; lot immediately reads issue_raised", body = Issue),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 404, description = "Lot not found", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn raise_issue(
    State(state): State<Arc<AppState>>,
    AuthExtractor(auth): AuthExtractor,
    Path(lot_id): Path<Uuid>,
    Json(req): Json<RaiseIssueRequest>,
) -> ApiResult<impl IntoResponse> {
    state.authorize_lot(&auth, lot_id).await?;
    let issue = services::raise_issue(&state.db, &state.notifier, lot_id, req).await?;
    Ok((StatusCode::CREATED, Json(issue)))
}

/// GET /api/v1/lots/{lot_id}/issues - List issues for a lot
#[utoipa::path(
    get,
    path = "/api/v1/lots/{lot_id}/issues",
    tag = "Issues",
    params(
        ("lot_id" = Uuid, Path, description = "Lot ID"),
        ("status" = Option<IssueStatus>, Query, description = "Filter by status"),
    ),
    responses(
        (status = 200, description = "Issues for the lot", body = ListIssuesResponse),
        (status = 404, description = "Lot not found", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn list_issues(
    State(state): State<Arc<AppState>>,
    AuthExtractor(auth): AuthExtractor,
    Path(lot_id): Path<Uuid>,
    Query(query): Query<ListIssuesQuery>,
) -> ApiResult<Json<ListIssuesResponse>> {
    state.authorize_lot(&auth, lot_id).await?;
    let issues = state.db.issues_for_lot(lot_id, query.status).await?;
    let total = issues.len() as i64;
    Ok(Json(ListIssuesResponse { issues, total }))
}

/// GET /api/v1/issues/{id} - Get issue by ID
#[utoipa::path(
    get,
    path = "/api/v1/issues/{id}",
    tag = "Issues",
    params(("id" = Uuid, Path, description = "Issue ID")),
    responses(
        (status = 200, description = "Issue details", body = Issue),
        (status = 404, description = "Issue not found", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn get_issue(
    State(state): State<Arc<AppState>>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Issue>> {
    let issue = state.authorize_issue(&auth, id).await?;
    Ok(Json(issue))
}

/// POST /api/v1/issues/{id}/respond - Responsible party's root-cause response
#[utoipa::path(
    post,
    path = "/api/v1/issues/{id}/respond",
    tag = "Issues",
    params(("id" = Uuid, Path, description = "Issue ID")),
    request_body = RespondIssueRequest,
    responses(
        (status = 200, description = "Response recorded", body = Issue),
        (status = 404, description = "Issue not found", body = ApiError),
        (status = 409, description = "Issue is not awaiting a response", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn respond_issue(
    State(state): State<Arc<AppState>>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<Uuid>,
    Json(req): Json<RespondIssueRequest>,
) -> ApiResult<Json<Issue>> {
    let issue = state.authorize_issue(&auth, id).await?;
    let updated = services::respond_to_issue(
        &state.db,
        &state.notifier,
        issue,
        req,
        state.workflow.review,
    )
    .await?;
    Ok(Json(updated))
}

/// POST /api/v1/issues/{id}/review - Quality-manager review verdict
#[utoipa::path(
    post,
    path = "/api/v1/issues/{id}/review",
    tag = "Issues",
    params(("id" = Uuid, Path, description = "Issue ID")),
    request_body = ReviewIssueRequest,
    responses(
        (status = 200, description = "Review applied", body = Issue),
        (status = 400, description = "Invalid verdict for this issue", body = ApiError),
        (status = 404, description = "Issue not found", body = ApiError),
        (status = 409, description = "Issue is not under investigation", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn review_issue(
    State(state): State<Arc<AppState>>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<Uuid>,
    Json(req): Json<ReviewIssueRequest>,
) -> ApiResult<Json<Issue>> {
    let issue = state.authorize_issue(&auth, id).await?;
    let updated = services::review_issue(
        &state.db,
        &state.notifier,
        issue,
        req,
        state.workflow.review,
    )
    .await?;
    Ok(Json(updated))
}

/// POST /api/v1/issues/{id}/rectify - Submit corrective evidence
#[utoipa::path(
    post,
    path = "/api/v1/issues/{id}/rectify",
    tag = "Issues",
    params(("id" = Uuid, Path, description = "Issue ID")),
    request_body = RectifyIssueRequest,
    responses(
        (status = 200, description = "Rectification recorded", body = RectifyIssueResponse),
        (status = 404, description = "Issue not found", body = ApiError),
        (status = 409, description = "Issue is not in rectification", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn rectify_issue(
    State(state): State<Arc<AppState>>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<Uuid>,
    Json(req): Json<RectifyIssueRequest>,
) -> ApiResult<Json<RectifyIssueResponse>> {
    let issue = state.authorize_issue(&auth, id).await?;
    let (issue, outcome) =
        services::rectify_issue(&state.db, &state.notifier, issue, req).await?;
    Ok(Json(RectifyIssueResponse { issue, outcome }))
}

/// POST /api/v1/issues/{id}/close - Verify and close
#[utoipa::path(
    post,
    path = "/api/v1/issues/{id}/close",
    tag = "Issues",
    params(("id" = Uuid, Path, description = "Issue ID")),
    request_body = CloseIssueRequest,
    responses(
        (status = 200, description = "Issue closed; lot unblocks if this was its last open issue", body = Issue),
        (status = 404, description = "Issue not found", body = ApiError),
        (status = 409, description = "Issue is not awaiting verification", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn close_issue(
    State(state): State<Arc<AppState>>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<Uuid>,
    Json(req): Json<CloseIssueRequest>,
) -> ApiResult<Json<Issue>> {
    let issue = state.authorize_issue(&auth, id).await?;
    let updated = services::close_issue(&state.db, &state.notifier, issue, req).await?;
    Ok(Json(updated))
}

/// Create the issue routes router.
pub fn create_router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route(
            "/api/v1/lots/:lot_id/issues",
            axum::routing::post(raise_issue).get(list_issues),
        )
        .route("/api/v1/issues/:id", axum::routing::get(get_issue))
        .route("/api/v1/issues/:id/respond", axum::routing::post(respond_issue))
        .route("/api/v1/issues/:id/review", axum::routing::post(review_issue))
        .route("/api/v1/issues/:id/rectify", axum::routing::post(rectify_issue))
        .route("/api/v1/issues/:id/close", axum::routing::post(close_issue))
        .with_state(state)
}
