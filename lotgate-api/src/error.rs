//! Error Types for the Lotgate API
//!
//! This module defines error handling for the API layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//!
//! All errors are serialized as JSON with appropriate HTTP status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lotgate_core::WorkflowError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code and represents
/// a category of error that can occur during API operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401, 403)
    // ========================================================================
    /// Request lacks valid authentication credentials
    Unauthorized,

    /// Request is authenticated but lacks permission for the resource
    Forbidden,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request validation failed (policy violations included)
    ValidationFailed,

    /// Request contains invalid input data
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    /// Field value is out of valid range
    InvalidRange,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested entity does not exist
    EntityNotFound,

    /// Requested inspection template does not exist
    TemplateNotFound,

    /// Requested inspection instance does not exist
    InstanceNotFound,

    /// Requested checkpoint does not exist
    CheckpointNotFound,

    /// Requested issue does not exist
    IssueNotFound,

    /// Requested lot does not exist
    LotNotFound,

    /// Release token does not exist (or is deliberately indistinguishable
    /// from one that never existed)
    TokenNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// Entity with the same identifier already exists
    EntityAlreadyExists,

    /// A lot already has an inspection instance
    InstanceAlreadyExists,

    /// Operation conflicts with current state (guard violation)
    StateConflict,

    /// Release token has already been consumed
    TokenConsumed,

    // ========================================================================
    // Gone (410)
    // ========================================================================
    /// Release token is past its expiry
    TokenExpired,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Database operation failed
    DatabaseError,

    /// Service is temporarily unavailable
    ServiceUnavailable,

    /// Database connection pool exhausted
    ConnectionPoolExhausted,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,

            ErrorCode::Forbidden => StatusCode::FORBIDDEN,

            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingField
            | ErrorCode::InvalidRange => StatusCode::BAD_REQUEST,

            ErrorCode::EntityNotFound
            | ErrorCode::TemplateNotFound
            | ErrorCode::InstanceNotFound
            | ErrorCode::CheckpointNotFound
            | ErrorCode::IssueNotFound
            | ErrorCode::LotNotFound
            | ErrorCode::TokenNotFound => StatusCode::NOT_FOUND,

            ErrorCode::EntityAlreadyExists
            | ErrorCode::InstanceAlreadyExists
            | ErrorCode::StateConflict
            | ErrorCode::TokenConsumed => StatusCode::CONFLICT,

            ErrorCode::TokenExpired => StatusCode::GONE,

            ErrorCode::ServiceUnavailable | ErrorCode::ConnectionPoolExhausted => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::Forbidden => "Access forbidden",

            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::InvalidRange => "Value is out of valid range",

            ErrorCode::EntityNotFound => "Entity not found",
            ErrorCode::TemplateNotFound => "Inspection template not found",
            ErrorCode::InstanceNotFound => "Inspection instance not found",
            ErrorCode::CheckpointNotFound => "Checkpoint not found",
            ErrorCode::IssueNotFound => "Issue not found",
            ErrorCode::LotNotFound => "Lot not found",
            ErrorCode::TokenNotFound => "Release link is not valid",

            ErrorCode::EntityAlreadyExists => "Entity already exists",
            ErrorCode::InstanceAlreadyExists => "Lot already has an inspection instance",
            ErrorCode::StateConflict => "Operation conflicts with current state",
            ErrorCode::TokenConsumed => "Release link has already been used",

            ErrorCode::TokenExpired => "Release link has expired",

            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::ConnectionPoolExhausted => "Connection pool exhausted",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
///
/// This type is returned by all API endpoints when an error occurs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (field errors, open counts, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    /// Create an Unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Create a Forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Create a ValidationFailed error.
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    /// Create an InvalidInput error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create a MissingField error.
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    /// Create an InvalidRange error.
    pub fn invalid_range(field: &str, min: impl fmt::Display, max: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::InvalidRange,
            format!("Field '{}' must be between {} and {}", field, min, max),
        )
    }

    /// Create a TemplateNotFound error.
    pub fn template_not_found(template_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::TemplateNotFound,
            format!("Inspection template {} not found", template_id),
        )
    }

    /// Create an InstanceNotFound error.
    pub fn instance_not_found(lot_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::InstanceNotFound,
            format!("Lot {} has no inspection instance", lot_id),
        )
    }

    /// Create a CheckpointNotFound error.
    pub fn checkpoint_not_found(checkpoint_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::CheckpointNotFound,
            format!("Checkpoint {} not found", checkpoint_id),
        )
    }

    /// Create an IssueNotFound error.
    pub fn issue_not_found(issue_id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::IssueNotFound, format!("Issue {} not found", issue_id))
    }

    /// Create a LotNotFound error.
    pub fn lot_not_found(lot_id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::LotNotFound, format!("Lot {} not found", lot_id))
    }

    /// Create a TokenNotFound error. Deliberately carries no detail about
    /// whether a near-matching secret exists.
    pub fn token_not_found() -> Self {
        Self::from_code(ErrorCode::TokenNotFound)
    }

    /// Create a TokenConsumed error.
    pub fn token_consumed() -> Self {
        Self::from_code(ErrorCode::TokenConsumed)
    }

    /// Create a TokenExpired error.
    pub fn token_expired() -> Self {
        Self::from_code(ErrorCode::TokenExpired)
    }

    /// Create an InstanceAlreadyExists error.
    pub fn instance_already_exists(lot_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::InstanceAlreadyExists,
            format!("Lot {} already has an inspection instance", lot_id),
        )
    }

    /// Create a StateConflict error.
    pub fn state_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StateConflict, message)
    }

    /// Create an InternalError.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Create a DatabaseError.
    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Create a ServiceUnavailable error.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    /// Create a ConnectionPoolExhausted error.
    pub fn connection_pool_exhausted() -> Self {
        Self::from_code(ErrorCode::ConnectionPoolExhausted)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

/// Implement IntoResponse for ApiError to enable automatic error handling
/// in Axum handlers.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM STANDARD ERRORS
// ============================================================================

/// Convert from the core workflow error taxonomy.
impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::NotFound { entity_type, id } => ApiError::new(
                ErrorCode::EntityNotFound,
                format!("{:?} {} not found", entity_type, id),
            ),
            WorkflowError::InvalidTransition { .. } => {
                ApiError::state_conflict(err.to_string())
            }
            WorkflowError::Duplicate { .. } => {
                ApiError::new(ErrorCode::EntityAlreadyExists, err.to_string())
            }
            WorkflowError::TokenExpired => ApiError::token_expired(),
            WorkflowError::Forbidden { reason } => ApiError::forbidden(reason),
            WorkflowError::Validation { .. } => ApiError::validation_failed(err.to_string()),
            WorkflowError::Snapshot { .. } => {
                // A malformed stored snapshot is a server-side defect.
                tracing::error!("snapshot error: {}", err);
                ApiError::internal_error("Stored snapshot could not be read")
            }
        }
    }
}

/// Convert from tokio_postgres::Error to ApiError.
impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        // Log the full error for debugging
        tracing::error!("Database error: {:?}", err);

        // Return a generic database error to avoid leaking internal details
        ApiError::database_error("Database operation failed")
    }
}

/// Convert from deadpool_postgres::PoolError to ApiError.
impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!("Connection pool error: {:?}", err);

        match err {
            deadpool_postgres::PoolError::Timeout(_) => ApiError::connection_pool_exhausted(),
            deadpool_postgres::PoolError::Closed => {
                ApiError::service_unavailable("Database connection pool is closed")
            }
            _ => ApiError::database_error("Failed to acquire database connection"),
        }
    }
}

/// Convert from serde_json::Error to ApiError.
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON serialization error: {:?}", err);
        ApiError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

/// Convert from uuid::Error to ApiError.
impl From<uuid::Error> for ApiError {
    fn from(err: uuid::Error) -> Self {
        ApiError::invalid_input(format!("Invalid UUID: {}", err))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use lotgate_core::EntityType;
    use uuid::Uuid;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::ValidationFailed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::CheckpointNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::TokenNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::StateConflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::TokenConsumed.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::TokenExpired.status_code(), StatusCode::GONE);
        assert_eq!(ErrorCode::InternalError.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_workflow_error_mapping() {
        let err: ApiError = WorkflowError::invalid_transition(
            EntityType::Checkpoint,
            Uuid::nil(),
            "cannot release a pending checkpoint",
        )
        .into();
        assert_eq!(err.code, ErrorCode::StateConflict);
        assert!(err.message.contains("cannot release"));

        let err: ApiError = WorkflowError::TokenExpired.into();
        assert_eq!(err.code, ErrorCode::TokenExpired);

        let err: ApiError = WorkflowError::validation("severity", "reserved for major").into();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[test]
    fn test_token_errors_carry_no_probe_detail() {
        let not_found = ApiError::token_not_found();
        assert_eq!(not_found.details, None);
        assert_eq!(not_found.message, ErrorCode::TokenNotFound.default_message());
    }

    #[test]
    fn test_api_error_with_details() {
        let details = serde_json::json!({
            "open_issues": 2,
            "open_checkpoints": 0
        });

        let err = ApiError::state_conflict("Lot is blocked").with_details(details.clone());
        assert_eq!(err.code, ErrorCode::StateConflict);
        assert_eq!(err.details, Some(details));
    }

    #[test]
    fn test_error_serialization() -> Result<(), serde_json::Error> {
        let err = ApiError::instance_already_exists(Uuid::nil());
        let json = serde_json::to_string(&err)?;

        assert!(json.contains("INSTANCE_ALREADY_EXISTS"));

        let deserialized: ApiError = serde_json::from_str(&json)?;
        assert_eq!(deserialized, err);
        Ok(())
    }
}
