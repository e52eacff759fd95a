//! Inspection Template REST API Routes
//!
//! Template authoring is deliberately thin: create and read. Templates are
//! never edited through the engine once lots have frozen snapshots of them;
//! a changed checklist is a new template.

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthExtractor;
use crate::state::AppState;
use crate::types::{CreateTemplateRequest, TemplateResponse};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use lotgate_core::ChecklistItem;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// POST /api/v1/templates - Create a template with its checklist
#[utoipa::path(
    post,
    path = "/api/v1/templates",
    tag = "Templates",
    request_body = CreateTemplateRequest,
    responses(
        (status = 201, description = "Template created", body = TemplateResponse),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn create_template(
    State(state): State<Arc<AppState>>,
    AuthExtractor(_auth): AuthExtractor,
    Json(req): Json<CreateTemplateRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.name.trim().is_empty() {
        return Err(ApiError::missing_field("name"));
    }
    if req.items.is_empty() {
        return Err(ApiError::validation_failed("a template needs at least one item"));
    }
    let mut seen = HashSet::new();
    for item in &req.items {
        if !seen.insert(item.sequence) {
            return Err(ApiError::validation_failed(format!(
                "duplicate sequence number {}",
                item.sequence
            )));
        }
        if item.description.trim().is_empty() {
            return Err(ApiError::missing_field("items[].description"));
        }
        if item.responsible_party.trim().is_empty() {
            return Err(ApiError::missing_field("items[].responsible_party"));
        }
    }

    // item_id and template_id are assigned by the db layer; the ones built
    // here are placeholders for the insert loop.
    let items: Vec<ChecklistItem> = req
        .items
        .iter()
        .map(|i| ChecklistItem {
            item_id: lotgate_core::new_entity_id(),
            template_id: lotgate_core::new_entity_id(),
            sequence: i.sequence,
            description: i.description.clone(),
            point_type: i.point_type,
            responsible_party: i.responsible_party.clone(),
            evidence_required: i.evidence_required,
            acceptance_criteria: i.acceptance_criteria.clone(),
        })
        .collect();

    let (template, items) = state
        .db
        .template_create(&req.name, &req.activity_type, &items)
        .await?;

    Ok((StatusCode::CREATED, Json(TemplateResponse { template, items })))
}

/// GET /api/v1/templates/{id} - Get a template and its checklist
#[utoipa::path(
    get,
    path = "/api/v1/templates/{id}",
    tag = "Templates",
    params(("id" = Uuid, Path, description = "Template ID")),
    responses(
        (status = 200, description = "Template details", body = TemplateResponse),
        (status = 404, description = "Template not found", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("api_key" = []))
)]
pub async fn get_template(
    State(state): State<Arc<AppState>>,
    AuthExtractor(_auth): AuthExtractor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<TemplateResponse>> {
    let (template, items) = state
        .db
        .template_get(id)
        .await?
        .ok_or_else(|| ApiError::template_not_found(id))?;
    Ok(Json(TemplateResponse { template, items }))
}

/// Create the template routes router.
pub fn create_router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route("/api/v1/templates", axum::routing::post(create_template))
        .route("/api/v1/templates/:id", axum::routing::get(get_template))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CreateChecklistItemRequest;
    use lotgate_core::PointType;

    #[test]
    fn test_duplicate_sequence_detection() {
        let items = vec![
            CreateChecklistItemRequest {
                sequence: 1,
                description: "Survey setout".to_string(),
                point_type: PointType::Standard,
                responsible_party: "contractor".to_string(),
                evidence_required: false,
                acceptance_criteria: None,
            },
            CreateChecklistItemRequest {
                sequence: 1,
                description: "Reinforcement check".to_string(),
                point_type: PointType::Hold,
                responsible_party: "engineer".to_string(),
                evidence_required: true,
                acceptance_criteria: None,
            },
        ];
        let mut seen = HashSet::new();
        assert!(seen.insert(items[0].sequence));
        assert!(!seen.insert(items[1].sequence));
    }
}
