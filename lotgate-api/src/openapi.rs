//! OpenAPI Specification for the Lotgate API
//!
//! Generated with utoipa from the route annotations and the schema derives
//! on lotgate-core entities, and served at /api-docs/openapi.json.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error::{ApiError, ErrorCode};
use crate::routes::{checkpoint, external, health, instance, issue, lot, template};
use crate::types::*;

use lotgate_core::{
    Checkpoint, ChecklistItem, CheckpointStatus, CompletionRecord, CompletionStatus,
    EscalationRecord, InspectionInstance, InspectionTemplate, Issue, IssueSeverity, IssueStatus,
    Lot, LotStatus, PointType, RectifyOutcome, ReleaseAttribution, ReleaseMethod, ReviewAction,
    SnapshotItem, SnapshotSource, TemplateSnapshot, VerificationStatus,
};

/// OpenAPI document for the Lotgate quality workflow API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Lotgate API",
        version = "0.1.0",
        description = "Quality workflow engine for construction inspection and test plans: \
            frozen checklist snapshots, hold-point checkpoints, external token releases, \
            and non-conformance issue tracking",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT"),
    ),
    servers(
        (url = "http://localhost:8080", description = "Local Development")
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Templates", description = "Inspection and test plan templates"),
        (name = "Lots", description = "Work units with derived workflow status"),
        (name = "Instances", description = "Per-lot inspection instances and completions"),
        (name = "Checkpoints", description = "Hold-point lifecycle and release"),
        (name = "Issues", description = "Non-conformance issue lifecycle"),
        (name = "External", description = "Token-based release gateway for external authorities"),
    ),
    paths(
        health::health,
        health::ready,

        template::create_template,
        template::get_template,

        lot::create_lot,
        lot::get_lot,

        instance::create_instance,
        instance::get_instance,
        instance::record_completion,

        checkpoint::list_checkpoints,
        checkpoint::stale_checkpoints,
        checkpoint::get_checkpoint,
        checkpoint::notify_checkpoint,
        checkpoint::chase_checkpoint,
        checkpoint::escalate_checkpoint,
        checkpoint::resolve_escalation,
        checkpoint::release_checkpoint,
        checkpoint::reject_checkpoint,
        checkpoint::issue_token,

        issue::raise_issue,
        issue::list_issues,
        issue::get_issue,
        issue::respond_issue,
        issue::review_issue,
        issue::rectify_issue,
        issue::close_issue,

        external::preview_release,
        external::submit_release,
    ),
    components(
        schemas(
            // Errors
            ApiError,
            ErrorCode,

            // Core entities
            InspectionTemplate,
            ChecklistItem,
            Lot,
            InspectionInstance,
            CompletionRecord,
            Checkpoint,
            EscalationRecord,
            ReleaseAttribution,
            Issue,
            TemplateSnapshot,
            SnapshotItem,

            // Core enums
            PointType,
            CompletionStatus,
            VerificationStatus,
            CheckpointStatus,
            ReleaseMethod,
            IssueStatus,
            IssueSeverity,
            ReviewAction,
            LotStatus,
            SnapshotSource,
            RectifyOutcome,

            // Request/response DTOs
            CreateTemplateRequest,
            CreateChecklistItemRequest,
            TemplateResponse,
            CreateLotRequest,
            LotStatusResponse,
            CreateInstanceRequest,
            ItemProgressView,
            InstanceProgressResponse,
            RecordCompletionRequest,
            RecordCompletionResponse,
            ListCheckpointsResponse,
            EscalateCheckpointRequest,
            ReleaseCheckpointRequest,
            RejectCheckpointRequest,
            IssueTokenRequest,
            IssueTokenResponse,
            TokenPreviewResponse,
            ExternalReleaseRequest,
            RaiseIssueRequest,
            RespondIssueRequest,
            ReviewIssueRequest,
            RectifyIssueRequest,
            RectifyIssueResponse,
            CloseIssueRequest,
            ListIssuesResponse,
            HealthResponse,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Adds the X-API-Key security scheme to the generated document.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-Key"))),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_document_builds() {
        let doc = ApiDoc::openapi();
        assert!(!doc.paths.paths.is_empty());
        let json = serde_json::to_string(&doc).expect("document serializes");
        assert!(json.contains("/external/release/{secret}"));
        assert!(json.contains("api_key"));
    }
}
