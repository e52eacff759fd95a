//! LOTGATE Core - Entity Types and Workflow State Machines
//!
//! Pure data structures and transition logic for the quality workflow engine.
//! No I/O lives here: the API crate persists these types and calls the guard
//! methods inside database transactions.

pub mod checkpoint;
pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;
pub mod issue;
pub mod snapshot;
pub mod status;

pub use checkpoint::EscalationRecord;
pub use entities::{
    Checkpoint, ChecklistItem, CompletionRecord, InspectionInstance, InspectionTemplate, Issue,
    Lot, ReleaseAttribution, ReleaseToken,
};
pub use enums::{
    CheckpointStatus, CheckpointStatusParseError, CompletionStatus, EntityType, IssueSeverity,
    IssueStatus, IssueStatusParseError, LotStatus, LotStatusParseError, PointType, ReleaseMethod,
    ReviewAction, VerificationStatus,
};
pub use error::{WorkflowError, WorkflowResult};
pub use identity::{
    compute_content_hash, new_entity_id, ContentHash, EntityId, Timestamp,
};
pub use issue::{RectifyOutcome, ReviewPolicy};
pub use snapshot::{SnapshotItem, SnapshotSource, TemplateSnapshot, SNAPSHOT_SCHEMA_VERSION};
pub use status::derive_lot_status;
