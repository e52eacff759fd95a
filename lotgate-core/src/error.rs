//! Error types for workflow operations

use crate::EntityType;
use thiserror::Error;
use uuid::Uuid;

/// Workflow engine errors.
///
/// Guard violations are always `InvalidTransition` (surfaced to API callers
/// as Conflict) so the UI can distinguish "already done" from "not allowed
/// yet" - they are never coerced into silent no-ops.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("Entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: Uuid },

    #[error("Invalid transition for {entity_type:?} {id}: {reason}")]
    InvalidTransition {
        entity_type: EntityType,
        id: Uuid,
        reason: String,
    },

    #[error("Duplicate {entity_type:?}: {reason}")]
    Duplicate { entity_type: EntityType, reason: String },

    #[error("Token expired or already consumed")]
    TokenExpired,

    #[error("Access denied: {reason}")]
    Forbidden { reason: String },

    #[error("Validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Snapshot error: {reason}")]
    Snapshot { reason: String },
}

impl WorkflowError {
    /// Shorthand for a guard violation on an entity.
    pub fn invalid_transition(
        entity_type: EntityType,
        id: Uuid,
        reason: impl Into<String>,
    ) -> Self {
        WorkflowError::InvalidTransition {
            entity_type,
            id,
            reason: reason.into(),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        WorkflowError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for workflow operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = WorkflowError::NotFound {
            entity_type: EntityType::Checkpoint,
            id: Uuid::nil(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Checkpoint"));
        assert!(msg.contains("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = WorkflowError::invalid_transition(
            EntityType::Issue,
            Uuid::nil(),
            "cannot close from open",
        );
        let msg = format!("{}", err);
        assert!(msg.contains("Invalid transition"));
        assert!(msg.contains("cannot close from open"));
    }

    #[test]
    fn test_validation_display() {
        let err = WorkflowError::validation("severity", "minor issues cannot be escalated");
        let msg = format!("{}", err);
        assert!(msg.contains("severity"));
        assert!(msg.contains("cannot be escalated"));
    }
}
