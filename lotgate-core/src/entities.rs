//! Core entity structures

use crate::{
    checkpoint::EscalationRecord, CheckpointStatus, CompletionStatus, EntityId, IssueSeverity,
    IssueStatus, LotStatus, PointType, ReleaseMethod, Timestamp, VerificationStatus,
};
use serde::{Deserialize, Serialize};

/// Inspection template - a mutable, reusable checklist definition.
/// Lives independently of any lot; authoring happens outside this engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct InspectionTemplate {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub template_id: EntityId,
    pub name: String,
    /// Activity type this template applies to (e.g. "earthworks", "concrete")
    pub activity_type: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

/// One inspectable requirement within a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChecklistItem {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub item_id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub template_id: EntityId,
    pub sequence: i32,
    pub description: String,
    pub point_type: PointType,
    /// Party responsible for completing this item (e.g. "contractor", "engineer")
    pub responsible_party: String,
    pub evidence_required: bool,
    pub acceptance_criteria: Option<String>,
}

/// Per-lot inspection instance created from a template snapshot.
///
/// `snapshot` is the write-once serialized copy of the template items taken
/// at assignment time; it is never re-synced to later template edits. A None
/// snapshot marks a legacy instance from before snapshotting existed, which
/// falls back to the live template on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct InspectionInstance {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub instance_id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub lot_id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub template_id: EntityId,
    /// Versioned snapshot blob (see `snapshot::TemplateSnapshot`)
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub snapshot: Option<serde_json::Value>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

/// Completion record for one checklist item within an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CompletionRecord {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub record_id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub instance_id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub item_id: EntityId,
    pub status: CompletionStatus,
    pub verification: VerificationStatus,
    pub completed_by: Option<String>,
    /// Opaque references resolved by the external evidence store
    pub evidence_refs: Vec<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub completed_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl CompletionRecord {
    // Derived flags are computed, never stored, so the booleans cannot
    // diverge from the status columns.

    pub fn is_completed(&self) -> bool {
        self.status == CompletionStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == CompletionStatus::Failed
    }

    pub fn is_verified(&self) -> bool {
        self.verification == VerificationStatus::Verified
    }

    pub fn is_pending_verification(&self) -> bool {
        self.verification == VerificationStatus::PendingVerification
    }
}

/// Attribution recorded when a checkpoint is released or rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ReleaseAttribution {
    pub released_by_name: String,
    pub released_by_org: Option<String>,
    pub release_notes: Option<String>,
    pub release_method: ReleaseMethod,
}

/// Hold-point checkpoint: a mandatory approval gate spawned from a completed
/// hold-type checklist item. At most one live checkpoint exists per
/// (lot, checklist item) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Checkpoint {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub checkpoint_id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub lot_id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub item_id: EntityId,
    pub status: CheckpointStatus,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub notification_sent_at: Option<Timestamp>,
    pub chase_count: i32,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub last_chased_at: Option<Timestamp>,
    /// Orthogonal escalation side-state; None when never escalated
    pub escalation: Option<EscalationRecord>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub released_at: Option<Timestamp>,
    pub release: Option<ReleaseAttribution>,
    /// Reason recorded on rejection
    pub rejection_reason: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

/// Single-use capability token for external checkpoint release.
///
/// The opaque secret is returned to the caller exactly once at issuance;
/// only its SHA-256 digest is stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ReleaseToken {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub token_id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub checkpoint_id: EntityId,
    /// Hex-encoded SHA-256 of the bearer secret
    pub secret_digest: String,
    pub recipient_email: String,
    pub recipient_name: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub expires_at: Timestamp,
    /// Set exactly once when the token is consumed
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub used_at: Option<Timestamp>,
    /// Set when a newer token for the same checkpoint replaces this one
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub superseded_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

impl ReleaseToken {
    /// A token is live when unused, unsuperseded, and unexpired.
    pub fn is_live(&self, now: Timestamp) -> bool {
        self.used_at.is_none() && self.superseded_at.is_none() && self.expires_at > now
    }
}

/// Non-conformance issue raised against a lot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Issue {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub issue_id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub lot_id: EntityId,
    pub raised_by: String,
    pub description: String,
    pub category: String,
    pub severity: IssueSeverity,
    pub status: IssueStatus,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub due_date: Option<Timestamp>,
    /// Other lots affected by the same deviation
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<String>))]
    pub affected_lot_ids: Vec<EntityId>,
    // Response phase
    pub root_cause: Option<String>,
    pub proposed_action: Option<String>,
    // QM review phase
    pub qm_review_comments: Option<String>,
    pub revision_requested: bool,
    pub revision_count: i32,
    // Rectification / verification phase
    pub rectification_notes: Option<String>,
    pub evidence_refs: Vec<String>,
    pub verification_notes: Option<String>,
    pub lessons_learned: Option<String>,
    // Escalation
    pub escalated_to: Option<String>,
    pub escalation_reason: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub escalated_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub closed_at: Option<Timestamp>,
}

/// Lot (work unit) - a discrete, trackable portion of physical work.
///
/// `status` is a derived column: the synchronizer writes it, nothing else
/// does. `resting_status` preserves the pre-blocking value so the
/// synchronizer can revert exactly when the last open issue/checkpoint
/// clears.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Lot {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub lot_id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub project_id: EntityId,
    pub name: String,
    pub status: LotStatus,
    pub resting_status: LotStatus,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::new_entity_id;
    use chrono::{Duration, Utc};

    fn sample_record(status: CompletionStatus, verification: VerificationStatus) -> CompletionRecord {
        CompletionRecord {
            record_id: new_entity_id(),
            instance_id: new_entity_id(),
            item_id: new_entity_id(),
            status,
            verification,
            completed_by: Some("inspector".to_string()),
            evidence_refs: vec![],
            completed_at: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_completion_record_derived_flags() {
        let rec = sample_record(CompletionStatus::Completed, VerificationStatus::PendingVerification);
        assert!(rec.is_completed());
        assert!(!rec.is_failed());
        assert!(rec.is_pending_verification());
        assert!(!rec.is_verified());

        let rec = sample_record(CompletionStatus::Failed, VerificationStatus::None);
        assert!(rec.is_failed());
        assert!(!rec.is_completed());
    }

    #[test]
    fn test_release_token_liveness() {
        let now = Utc::now();
        let mut token = ReleaseToken {
            token_id: new_entity_id(),
            checkpoint_id: new_entity_id(),
            secret_digest: "ab".repeat(32),
            recipient_email: "client@example.com".to_string(),
            recipient_name: "Client Rep".to_string(),
            expires_at: now + Duration::hours(48),
            used_at: None,
            superseded_at: None,
            created_at: now,
        };
        assert!(token.is_live(now));
        assert!(!token.is_live(now + Duration::hours(49)));

        token.used_at = Some(now);
        assert!(!token.is_live(now));

        token.used_at = None;
        token.superseded_at = Some(now);
        assert!(!token.is_live(now));
    }
}
