//! Property tests for the workflow-to-HTTP error mapping.
//!
//! Whatever free text rides along in a core error, the HTTP status and
//! error code it maps to must stay fixed, and the message must never leak
//! formatting surprises (empty bodies, panics on odd strings).

use axum::http::StatusCode;
use lotgate_api::{ApiError, ErrorCode};
use lotgate_core::{EntityType, WorkflowError};
use proptest::prelude::*;
use uuid::Uuid;

fn entity_type_strategy() -> impl Strategy<Value = EntityType> {
    prop_oneof![
        Just(EntityType::Template),
        Just(EntityType::Lot),
        Just(EntityType::Instance),
        Just(EntityType::Checkpoint),
        Just(EntityType::Issue),
    ]
}

proptest! {
    #[test]
    fn invalid_transition_always_maps_to_conflict(
        entity_type in entity_type_strategy(),
        reason in ".{0,200}",
    ) {
        let err = WorkflowError::invalid_transition(entity_type, Uuid::now_v7(), reason);
        let api: ApiError = err.into();
        prop_assert_eq!(api.code, ErrorCode::StateConflict);
        prop_assert_eq!(api.status_code(), StatusCode::CONFLICT);
        prop_assert!(!api.message.is_empty());
    }

    #[test]
    fn not_found_always_maps_to_404(entity_type in entity_type_strategy()) {
        let err = WorkflowError::NotFound { entity_type, id: Uuid::now_v7() };
        let api: ApiError = err.into();
        prop_assert_eq!(api.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_always_maps_to_400(
        field in "[a-z_]{1,30}",
        reason in ".{0,200}",
    ) {
        let err = WorkflowError::validation(field, reason);
        let api: ApiError = err.into();
        prop_assert_eq!(api.code, ErrorCode::ValidationFailed);
        prop_assert_eq!(api.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn snapshot_errors_never_leak_the_reason(reason in ".{1,200}") {
        // Snapshot corruption details go to the log, not the client.
        let err = WorkflowError::Snapshot { reason: reason.clone() };
        let api: ApiError = err.into();
        prop_assert_eq!(api.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        prop_assert!(!api.message.contains(&reason) || reason.is_empty());
    }
}

#[test]
fn token_errors_have_distinct_statuses() {
    assert_eq!(
        ApiError::token_expired().status_code(),
        StatusCode::GONE
    );
    assert_eq!(
        ApiError::token_consumed().status_code(),
        StatusCode::CONFLICT
    );
    assert_eq!(
        ApiError::token_not_found().status_code(),
        StatusCode::NOT_FOUND
    );
}
