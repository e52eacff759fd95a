//! API Request/Response Types
//!
//! Wire-level DTOs for the REST API. Persistent entities from lotgate-core
//! serialize directly; the types here are the request envelopes and the
//! composed responses (entity + derived context) that have no storage
//! counterpart.

use chrono::{DateTime, Utc};
use lotgate_core::{
    Checkpoint, ChecklistItem, CompletionRecord, CompletionStatus, InspectionInstance,
    InspectionTemplate, Issue, IssueSeverity, Lot, PointType, RectifyOutcome, ReviewAction,
    SnapshotItem, SnapshotSource, VerificationStatus,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// ============================================================================
// TEMPLATE TYPES
// ============================================================================

/// Request to create an inspection template with its checklist.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateTemplateRequest {
    pub name: String,
    pub activity_type: String,
    pub items: Vec<CreateChecklistItemRequest>,
}

/// One checklist item in a template creation request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateChecklistItemRequest {
    pub sequence: i32,
    pub description: String,
    pub point_type: PointType,
    pub responsible_party: String,
    #[serde(default)]
    pub evidence_required: bool,
    #[serde(default)]
    pub acceptance_criteria: Option<String>,
}

/// Template with its checklist items.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TemplateResponse {
    pub template: InspectionTemplate,
    pub items: Vec<ChecklistItem>,
}

// ============================================================================
// LOT TYPES
// ============================================================================

/// Request to register a lot (work unit).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateLotRequest {
    pub project_id: Uuid,
    pub name: String,
}

/// Lot with its open-work context, so clients can see WHY the derived
/// status is what it is.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LotStatusResponse {
    pub lot: Lot,
    pub open_issues: i64,
    pub open_checkpoints: i64,
}

// ============================================================================
// INSPECTION INSTANCE TYPES
// ============================================================================

/// Request to instantiate a template against a lot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateInstanceRequest {
    pub template_id: Uuid,
}

/// One checklist row as the instance sees it (snapshot or legacy live
/// template), merged with its completion record if any.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ItemProgressView {
    pub item_id: Uuid,
    pub sequence: i32,
    pub description: String,
    pub point_type: PointType,
    pub responsible_party: String,
    pub evidence_required: bool,
    pub acceptance_criteria: Option<String>,
    pub completion: Option<CompletionRecord>,
}

/// Full progress view of a lot's inspection instance.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InstanceProgressResponse {
    pub instance: InspectionInstance,
    /// Whether the checklist below came from the frozen snapshot or from
    /// the live template (legacy instances only).
    pub source: SnapshotSource,
    pub items: Vec<ItemProgressView>,
}

/// Request to record a completion for one checklist item.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordCompletionRequest {
    pub item_id: Uuid,
    pub status: CompletionStatus,
    #[serde(default)]
    pub verification: Option<VerificationStatus>,
    #[serde(default)]
    pub completed_by: Option<String>,
    #[serde(default)]
    pub evidence_refs: Vec<String>,
}

/// Completion record plus the hold-point checkpoint it spawned, if any.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordCompletionResponse {
    pub record: CompletionRecord,
    /// Present when completing a hold point spawned a new checkpoint.
    pub spawned_checkpoint: Option<Checkpoint>,
}

// ============================================================================
// CHECKPOINT TYPES
// ============================================================================

/// Checkpoint list for a lot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListCheckpointsResponse {
    pub checkpoints: Vec<Checkpoint>,
    pub total: i64,
}

/// Request to escalate an unanswered checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EscalateCheckpointRequest {
    pub escalated_by: String,
    pub escalated_to: Vec<String>,
    pub reason: String,
}

/// Request to release a checkpoint internally on behalf of an authority.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReleaseCheckpointRequest {
    pub released_by_name: String,
    #[serde(default)]
    pub released_by_org: Option<String>,
    #[serde(default)]
    pub release_notes: Option<String>,
}

/// Request to reject a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RejectCheckpointRequest {
    pub reason: String,
}

/// Request to issue an external release token for a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IssueTokenRequest {
    pub recipient_email: String,
    pub recipient_name: String,
    /// Override the configured token lifetime, in hours.
    #[serde(default)]
    pub ttl_hours: Option<i64>,
}

/// Issued token. The secret appears here ONCE and is never retrievable
/// again; only its digest is stored.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IssueTokenResponse {
    pub token_id: Uuid,
    pub checkpoint_id: Uuid,
    pub secret: String,
    pub recipient_email: String,
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// EXTERNAL RELEASE GATEWAY TYPES
// ============================================================================

/// What an external authority sees when previewing their release link.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenPreviewResponse {
    pub checkpoint: Checkpoint,
    pub project_id: Uuid,
    pub lot_name: String,
    /// The frozen checklist item the hold point originated from, when the
    /// snapshot still resolves it.
    pub item: Option<SnapshotItem>,
    /// Evidence references attached to the item's completion record.
    pub evidence_refs: Vec<String>,
    pub recipient_name: String,
    pub expires_at: DateTime<Utc>,
}

/// External release submission. Attribution is free text because the
/// authority is not a system principal.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExternalReleaseRequest {
    pub released_by_name: String,
    #[serde(default)]
    pub released_by_org: Option<String>,
    #[serde(default)]
    pub release_notes: Option<String>,
}

// ============================================================================
// ISSUE TYPES
// ============================================================================

/// Request to raise a non-conformance issue against a lot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RaiseIssueRequest {
    pub raised_by: String,
    pub description: String,
    pub category: String,
    pub severity: IssueSeverity,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub affected_lot_ids: Vec<Uuid>,
}

/// Responsible party's root-cause response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RespondIssueRequest {
    pub root_cause: String,
    pub proposed_action: String,
}

/// Quality-manager review verdict.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReviewIssueRequest {
    pub action: ReviewAction,
    #[serde(default)]
    pub comments: Option<String>,
    /// Required when action is Escalate.
    #[serde(default)]
    pub escalated_to: Option<String>,
}

/// Rectification evidence submission.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RectifyIssueRequest {
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub evidence_refs: Vec<String>,
}

/// Issue plus whether the rectification advanced it to verification.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RectifyIssueResponse {
    pub issue: Issue,
    pub outcome: RectifyOutcome,
}

/// Final verification and closure.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CloseIssueRequest {
    #[serde(default)]
    pub verification_notes: Option<String>,
    #[serde(default)]
    pub lessons_learned: Option<String>,
    /// True closes as accepted-by-concession rather than rectified.
    #[serde(default)]
    pub concession: bool,
}

/// Issue list for a lot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListIssuesResponse {
    pub issues: Vec<Issue>,
    pub total: i64,
}

// ============================================================================
// HEALTH TYPES
// ============================================================================

/// Liveness/readiness report.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
    pub uptime_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_completion_request_defaults() {
        let json = serde_json::json!({
            "item_id": Uuid::nil(),
            "status": "completed",
        });
        let req: RecordCompletionRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.status, CompletionStatus::Completed);
        assert!(req.verification.is_none());
        assert!(req.evidence_refs.is_empty());
    }

    #[test]
    fn test_review_request_escalate_round_trip() {
        let req = ReviewIssueRequest {
            action: ReviewAction::Escalate,
            comments: Some("beyond site authority".to_string()),
            escalated_to: Some("regional.qm@example.com".to_string()),
        };
        let json = serde_json::to_value(&req).unwrap();
        let back: ReviewIssueRequest = serde_json::from_value(json).unwrap();
        assert_eq!(back.action, ReviewAction::Escalate);
        assert!(back.escalated_to.is_some());
    }

    #[test]
    fn test_external_release_request_minimal() {
        let json = serde_json::json!({ "released_by_name": "J. Inspector" });
        let req: ExternalReleaseRequest = serde_json::from_value(json).unwrap();
        assert!(req.released_by_org.is_none());
        assert!(req.release_notes.is_none());
    }
}
