//! Template snapshot: the immutable copy of a template's checklist items
//! taken at the moment it is assigned to a lot.
//!
//! The snapshot is stored as an opaque JSON blob on the inspection instance
//! and carries an explicit `schema_version` tag so future format changes can
//! branch on read without breaking old instances. It is write-once: nothing
//! mutates it after creation, and later edits to the live template never
//! retroactively alter what a lot was inspected against.

use crate::{ChecklistItem, EntityId, InspectionTemplate, PointType, WorkflowError, WorkflowResult};
use serde::{Deserialize, Serialize};

/// Current snapshot blob schema version.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Where an instance's checklist view came from.
///
/// `LiveTemplate` exists only for legacy instances created before
/// snapshotting; readers must surface the distinction, never silently merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    Snapshot,
    LiveTemplate,
}

/// One checklist item as frozen into a snapshot, with point-type flags
/// expanded for callers that should not re-derive them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SnapshotItem {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub item_id: EntityId,
    pub sequence: i32,
    pub description: String,
    pub point_type: PointType,
    pub is_hold_point: bool,
    pub is_witness_point: bool,
    pub responsible_party: String,
    pub evidence_required: bool,
    pub acceptance_criteria: Option<String>,
}

impl From<&ChecklistItem> for SnapshotItem {
    fn from(item: &ChecklistItem) -> Self {
        Self {
            item_id: item.item_id,
            sequence: item.sequence,
            description: item.description.clone(),
            point_type: item.point_type,
            is_hold_point: item.point_type.is_hold_point(),
            is_witness_point: item.point_type.is_witness_point(),
            responsible_party: item.responsible_party.clone(),
            evidence_required: item.evidence_required,
            acceptance_criteria: item.acceptance_criteria.clone(),
        }
    }
}

/// The versioned snapshot blob persisted on an inspection instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TemplateSnapshot {
    pub schema_version: u32,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub template_id: EntityId,
    pub template_name: String,
    pub activity_type: String,
    pub items: Vec<SnapshotItem>,
}

impl TemplateSnapshot {
    /// Freeze a template and its items into a snapshot.
    ///
    /// Items are sorted by sequence so the frozen order is canonical
    /// regardless of how the caller fetched them.
    pub fn freeze(template: &InspectionTemplate, items: &[ChecklistItem]) -> Self {
        let mut items: Vec<SnapshotItem> = items.iter().map(SnapshotItem::from).collect();
        items.sort_by_key(|i| i.sequence);
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            template_id: template.template_id,
            template_name: template.name.clone(),
            activity_type: template.activity_type.clone(),
            items,
        }
    }

    /// Serialize to the opaque JSON blob stored on the instance.
    pub fn to_blob(&self) -> WorkflowResult<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| WorkflowError::Snapshot {
            reason: format!("serialize failed: {}", e),
        })
    }

    /// Parse a stored blob, branching on its schema version.
    ///
    /// Unknown future versions are an error rather than a best-effort parse:
    /// the audit guarantee is worthless if a reader silently misreads a blob.
    pub fn from_blob(blob: &serde_json::Value) -> WorkflowResult<Self> {
        let version = blob
            .get("schema_version")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| WorkflowError::Snapshot {
                reason: "missing schema_version tag".to_string(),
            })?;

        match version {
            1 => serde_json::from_value(blob.clone()).map_err(|e| WorkflowError::Snapshot {
                reason: format!("v1 parse failed: {}", e),
            }),
            other => Err(WorkflowError::Snapshot {
                reason: format!("unsupported snapshot schema version {}", other),
            }),
        }
    }

    /// Items restricted to a responsible party, for filtered instance views.
    /// Read-only: the stored blob is untouched.
    pub fn items_for_party(&self, party: &str) -> Vec<&SnapshotItem> {
        self.items
            .iter()
            .filter(|i| i.responsible_party.eq_ignore_ascii_case(party))
            .collect()
    }

    /// Find a frozen item by id.
    pub fn item(&self, item_id: EntityId) -> Option<&SnapshotItem> {
        self.items.iter().find(|i| i.item_id == item_id)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::new_entity_id;
    use chrono::Utc;

    fn sample_template() -> InspectionTemplate {
        InspectionTemplate {
            template_id: new_entity_id(),
            name: "Concrete pour ITP".to_string(),
            activity_type: "concrete".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_item(template_id: EntityId, sequence: i32, point_type: PointType) -> ChecklistItem {
        ChecklistItem {
            item_id: new_entity_id(),
            template_id,
            sequence,
            description: format!("Step {}", sequence),
            point_type,
            responsible_party: if sequence % 2 == 0 {
                "contractor".to_string()
            } else {
                "engineer".to_string()
            },
            evidence_required: point_type == PointType::Hold,
            acceptance_criteria: None,
        }
    }

    #[test]
    fn test_freeze_sorts_by_sequence_and_expands_flags() {
        let template = sample_template();
        let items = vec![
            sample_item(template.template_id, 3, PointType::Hold),
            sample_item(template.template_id, 1, PointType::Standard),
            sample_item(template.template_id, 2, PointType::Witness),
        ];
        let snap = TemplateSnapshot::freeze(&template, &items);

        assert_eq!(snap.schema_version, SNAPSHOT_SCHEMA_VERSION);
        assert_eq!(
            snap.items.iter().map(|i| i.sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(snap.items[2].is_hold_point);
        assert!(snap.items[1].is_witness_point);
        assert!(!snap.items[0].is_hold_point);
    }

    #[test]
    fn test_blob_roundtrip() {
        let template = sample_template();
        let items = vec![sample_item(template.template_id, 1, PointType::Hold)];
        let snap = TemplateSnapshot::freeze(&template, &items);

        let blob = snap.to_blob().unwrap();
        let parsed = TemplateSnapshot::from_blob(&blob).unwrap();
        assert_eq!(parsed, snap);
    }

    #[test]
    fn test_blob_missing_version_rejected() {
        let blob = serde_json::json!({ "items": [] });
        let err = TemplateSnapshot::from_blob(&blob).unwrap_err();
        assert!(matches!(err, WorkflowError::Snapshot { .. }));
    }

    #[test]
    fn test_blob_future_version_rejected() {
        let template = sample_template();
        let snap = TemplateSnapshot::freeze(&template, &[]);
        let mut blob = snap.to_blob().unwrap();
        blob["schema_version"] = serde_json::json!(99);
        let err = TemplateSnapshot::from_blob(&blob).unwrap_err();
        assert!(matches!(err, WorkflowError::Snapshot { .. }));
    }

    #[test]
    fn test_items_for_party_filter_is_read_only() {
        let template = sample_template();
        let items = vec![
            sample_item(template.template_id, 1, PointType::Standard), // engineer
            sample_item(template.template_id, 2, PointType::Standard), // contractor
            sample_item(template.template_id, 3, PointType::Hold),     // engineer
        ];
        let snap = TemplateSnapshot::freeze(&template, &items);

        let engineer_items = snap.items_for_party("Engineer");
        assert_eq!(engineer_items.len(), 2);
        // Original snapshot untouched
        assert_eq!(snap.items.len(), 3);
    }
}
