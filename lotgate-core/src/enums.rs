//! Status and discriminator enums for the quality workflow engine.
//!
//! Every status enum carries `as_db_str`/`from_db_str` for the TEXT columns
//! the API layer persists, plus `is_terminal` where a lifecycle exists.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ENTITY TYPE
// ============================================================================

/// Entity type discriminator for polymorphic references and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum EntityType {
    Template,
    ChecklistItem,
    Instance,
    CompletionRecord,
    Checkpoint,
    ReleaseToken,
    Issue,
    Lot,
}

// ============================================================================
// CHECKLIST POINT TYPES
// ============================================================================

/// Inspection point type of a checklist item.
///
/// `Hold` items are mandatory approval gates: completing one spawns a
/// checkpoint that blocks the lot until released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum PointType {
    Standard,
    Witness,
    Hold,
}

impl PointType {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            PointType::Standard => "standard",
            PointType::Witness => "witness",
            PointType::Hold => "hold",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, PointTypeParseError> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(PointType::Standard),
            "witness" => Ok(PointType::Witness),
            "hold" => Ok(PointType::Hold),
            _ => Err(PointTypeParseError(s.to_string())),
        }
    }

    /// Hold points gate lot progress until explicitly released.
    pub fn is_hold_point(&self) -> bool {
        matches!(self, PointType::Hold)
    }

    pub fn is_witness_point(&self) -> bool {
        matches!(self, PointType::Witness)
    }
}

impl fmt::Display for PointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for PointType {
    type Err = PointTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid point type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointTypeParseError(pub String);

impl fmt::Display for PointTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid point type: {}", self.0)
    }
}

impl std::error::Error for PointTypeParseError {}

// ============================================================================
// COMPLETION / VERIFICATION STATUS
// ============================================================================

/// Status of a single checklist-item completion record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Pending,
    Completed,
    Failed,
    NotApplicable,
}

impl CompletionStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            CompletionStatus::Pending => "pending",
            CompletionStatus::Completed => "completed",
            CompletionStatus::Failed => "failed",
            CompletionStatus::NotApplicable => "not_applicable",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, CompletionStatusParseError> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(CompletionStatus::Pending),
            "completed" | "complete" => Ok(CompletionStatus::Completed),
            "failed" => Ok(CompletionStatus::Failed),
            "not_applicable" | "na" | "n/a" => Ok(CompletionStatus::NotApplicable),
            _ => Err(CompletionStatusParseError(s.to_string())),
        }
    }
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for CompletionStatus {
    type Err = CompletionStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid completion status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionStatusParseError(pub String);

impl fmt::Display for CompletionStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid completion status: {}", self.0)
    }
}

impl std::error::Error for CompletionStatusParseError {}

/// Verification status of a completion record, tracked separately from the
/// completion itself so a completed item can await sign-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    None,
    PendingVerification,
    Verified,
}

impl VerificationStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            VerificationStatus::None => "none",
            VerificationStatus::PendingVerification => "pending_verification",
            VerificationStatus::Verified => "verified",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, VerificationStatusParseError> {
        match s.to_lowercase().as_str() {
            "none" => Ok(VerificationStatus::None),
            "pending_verification" | "pending" => Ok(VerificationStatus::PendingVerification),
            "verified" => Ok(VerificationStatus::Verified),
            _ => Err(VerificationStatusParseError(s.to_string())),
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

/// Error when parsing an invalid verification status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationStatusParseError(pub String);

impl fmt::Display for VerificationStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid verification status: {}", self.0)
    }
}

impl std::error::Error for VerificationStatusParseError {}

// ============================================================================
// CHECKPOINT STATUS
// ============================================================================

/// Primary state of a hold-point checkpoint.
///
/// Escalation is deliberately NOT part of this enum: it is an orthogonal
/// flag carried as `Option<EscalationRecord>` on the checkpoint, so the
/// primary machine stays `pending -> notified -> (released | rejected)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    /// Created from a completed hold item, recipients not yet notified
    Pending,
    /// Responsible parties notified, awaiting release decision
    Notified,
    /// Released - the gate is open (terminal)
    Released,
    /// Rejected - the gate stays shut, re-work required (terminal)
    Rejected,
}

impl CheckpointStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Pending => "pending",
            CheckpointStatus::Notified => "notified",
            CheckpointStatus::Released => "released",
            CheckpointStatus::Rejected => "rejected",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, CheckpointStatusParseError> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(CheckpointStatus::Pending),
            "notified" => Ok(CheckpointStatus::Notified),
            "released" => Ok(CheckpointStatus::Released),
            "rejected" => Ok(CheckpointStatus::Rejected),
            _ => Err(CheckpointStatusParseError(s.to_string())),
        }
    }

    /// Check if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckpointStatus::Released | CheckpointStatus::Rejected)
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for CheckpointStatus {
    type Err = CheckpointStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid checkpoint status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointStatusParseError(pub String);

impl fmt::Display for CheckpointStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid checkpoint status: {}", self.0)
    }
}

impl std::error::Error for CheckpointStatusParseError {}

// ============================================================================
// RELEASE METHOD
// ============================================================================

/// How a checkpoint release was performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ReleaseMethod {
    /// Released by an authenticated project member
    Internal,
    /// Released by an external party via a single-use capability token
    ExternalToken,
}

impl ReleaseMethod {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ReleaseMethod::Internal => "internal",
            ReleaseMethod::ExternalToken => "external_token",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, ReleaseMethodParseError> {
        match s.to_lowercase().as_str() {
            "internal" => Ok(ReleaseMethod::Internal),
            "external_token" | "external" | "token" => Ok(ReleaseMethod::ExternalToken),
            _ => Err(ReleaseMethodParseError(s.to_string())),
        }
    }
}

impl fmt::Display for ReleaseMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

/// Error when parsing an invalid release method string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseMethodParseError(pub String);

impl fmt::Display for ReleaseMethodParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid release method: {}", self.0)
    }
}

impl std::error::Error for ReleaseMethodParseError {}

// ============================================================================
// ISSUE (NON-CONFORMANCE) STATUS AND SEVERITY
// ============================================================================

/// Status of a non-conformance issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    /// Raised, awaiting a response from the responsible party
    Open,
    /// Response received, under investigation / QM review
    Investigating,
    /// Corrective action in progress
    Rectification,
    /// Corrective evidence submitted, awaiting verification
    Verification,
    /// Closed after verification (terminal)
    Closed,
    /// Closed as accepted-as-is concession (terminal)
    ClosedConcession,
    /// Escalated out of the normal lifecycle (terminal for this machine)
    Escalated,
}

impl IssueStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            IssueStatus::Open => "open",
            IssueStatus::Investigating => "investigating",
            IssueStatus::Rectification => "rectification",
            IssueStatus::Verification => "verification",
            IssueStatus::Closed => "closed",
            IssueStatus::ClosedConcession => "closed_concession",
            IssueStatus::Escalated => "escalated",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, IssueStatusParseError> {
        match s.to_lowercase().as_str() {
            "open" => Ok(IssueStatus::Open),
            "investigating" => Ok(IssueStatus::Investigating),
            "rectification" => Ok(IssueStatus::Rectification),
            "verification" => Ok(IssueStatus::Verification),
            "closed" => Ok(IssueStatus::Closed),
            "closed_concession" | "closed-concession" => Ok(IssueStatus::ClosedConcession),
            "escalated" => Ok(IssueStatus::Escalated),
            _ => Err(IssueStatusParseError(s.to_string())),
        }
    }

    /// Closed states stop counting against the lot's derived status.
    /// An escalated issue is still open for derivation purposes: the lot
    /// stays blocked until whoever owns the escalation closes it out.
    pub fn is_closed(&self) -> bool {
        matches!(self, IssueStatus::Closed | IssueStatus::ClosedConcession)
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for IssueStatus {
    type Err = IssueStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid issue status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueStatusParseError(pub String);

impl fmt::Display for IssueStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid issue status: {}", self.0)
    }
}

impl std::error::Error for IssueStatusParseError {}

/// Severity of a non-conformance issue. Drives QM review policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Minor,
    Major,
}

impl IssueSeverity {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            IssueSeverity::Minor => "minor",
            IssueSeverity::Major => "major",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, IssueSeverityParseError> {
        match s.to_lowercase().as_str() {
            "minor" => Ok(IssueSeverity::Minor),
            "major" => Ok(IssueSeverity::Major),
            _ => Err(IssueSeverityParseError(s.to_string())),
        }
    }
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for IssueSeverity {
    type Err = IssueSeverityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid issue severity string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueSeverityParseError(pub String);

impl fmt::Display for IssueSeverityParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid issue severity: {}", self.0)
    }
}

impl std::error::Error for IssueSeverityParseError {}

// ============================================================================
// QM REVIEW ACTION
// ============================================================================

/// Action taken by the quality manager when reviewing an investigating issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    /// Accept the proposed action, advance to rectification
    Accept,
    /// Send back for another response; does not advance the state
    RequestRevision,
    /// Escalate out of the normal lifecycle (major issues by policy)
    Escalate,
}

impl ReviewAction {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ReviewAction::Accept => "accept",
            ReviewAction::RequestRevision => "request_revision",
            ReviewAction::Escalate => "escalate",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, ReviewActionParseError> {
        match s.to_lowercase().as_str() {
            "accept" => Ok(ReviewAction::Accept),
            "request_revision" | "request-revision" | "revise" => Ok(ReviewAction::RequestRevision),
            "escalate" => Ok(ReviewAction::Escalate),
            _ => Err(ReviewActionParseError(s.to_string())),
        }
    }
}

impl fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for ReviewAction {
    type Err = ReviewActionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid review action string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewActionParseError(pub String);

impl fmt::Display for ReviewActionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid review action: {}", self.0)
    }
}

impl std::error::Error for ReviewActionParseError {}

// ============================================================================
// LOT STATUS
// ============================================================================

/// Externally visible status of a lot (work unit).
///
/// `IssueRaised` and `OnHold` are DERIVED values: the synchronizer computes
/// them from the set of open issues/checkpoints and nothing else ever writes
/// them. The remaining values are "resting" statuses owned by ordinary
/// progress tracking outside this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum LotStatus {
    NotStarted,
    InProgress,
    /// Blocked: at least one hold-point checkpoint is awaiting release
    OnHold,
    /// Blocked: at least one non-conformance issue is open (overrides OnHold)
    IssueRaised,
    Completed,
}

impl LotStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            LotStatus::NotStarted => "not_started",
            LotStatus::InProgress => "in_progress",
            LotStatus::OnHold => "on_hold",
            LotStatus::IssueRaised => "issue_raised",
            LotStatus::Completed => "completed",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, LotStatusParseError> {
        match s.to_lowercase().as_str() {
            "not_started" | "not-started" => Ok(LotStatus::NotStarted),
            "in_progress" | "in-progress" | "inprogress" => Ok(LotStatus::InProgress),
            "on_hold" | "on-hold" | "hold" => Ok(LotStatus::OnHold),
            "issue_raised" | "issue-raised" => Ok(LotStatus::IssueRaised),
            "completed" | "complete" => Ok(LotStatus::Completed),
            _ => Err(LotStatusParseError(s.to_string())),
        }
    }

    /// A blocked status is one the synchronizer derives; a resting status is
    /// one it reverts to when the last blocking condition clears.
    pub fn is_blocked(&self) -> bool {
        matches!(self, LotStatus::OnHold | LotStatus::IssueRaised)
    }
}

impl fmt::Display for LotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for LotStatus {
    type Err = LotStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid lot status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotStatusParseError(pub String);

impl fmt::Display for LotStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid lot status: {}", self.0)
    }
}

impl std::error::Error for LotStatusParseError {}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_status_roundtrip() {
        for status in [
            CheckpointStatus::Pending,
            CheckpointStatus::Notified,
            CheckpointStatus::Released,
            CheckpointStatus::Rejected,
        ] {
            let parsed = CheckpointStatus::from_db_str(status.as_db_str());
            assert_eq!(parsed, Ok(status));
        }
    }

    #[test]
    fn test_checkpoint_terminal_states() {
        assert!(!CheckpointStatus::Pending.is_terminal());
        assert!(!CheckpointStatus::Notified.is_terminal());
        assert!(CheckpointStatus::Released.is_terminal());
        assert!(CheckpointStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_issue_status_closed_set() {
        assert!(IssueStatus::Closed.is_closed());
        assert!(IssueStatus::ClosedConcession.is_closed());
        // Escalated issues still block the lot
        assert!(!IssueStatus::Escalated.is_closed());
        assert!(!IssueStatus::Open.is_closed());
        assert!(!IssueStatus::Verification.is_closed());
    }

    #[test]
    fn test_issue_status_parse_variants() {
        assert_eq!(
            IssueStatus::from_db_str("closed-concession"),
            Ok(IssueStatus::ClosedConcession)
        );
        assert!(IssueStatus::from_db_str("bogus").is_err());
    }

    #[test]
    fn test_point_type_flags() {
        assert!(PointType::Hold.is_hold_point());
        assert!(!PointType::Hold.is_witness_point());
        assert!(PointType::Witness.is_witness_point());
        assert!(!PointType::Standard.is_hold_point());
    }

    #[test]
    fn test_lot_status_blocked_set() {
        assert!(LotStatus::OnHold.is_blocked());
        assert!(LotStatus::IssueRaised.is_blocked());
        assert!(!LotStatus::InProgress.is_blocked());
        assert!(!LotStatus::Completed.is_blocked());
    }

    #[test]
    fn test_review_action_parse() {
        assert_eq!(
            ReviewAction::from_db_str("request_revision"),
            Ok(ReviewAction::RequestRevision)
        );
        assert_eq!(ReviewAction::from_db_str("ACCEPT"), Ok(ReviewAction::Accept));
        assert!(ReviewAction::from_db_str("defer").is_err());
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(IssueSeverity::Major.to_string(), "major");
        assert_eq!("minor".parse::<IssueSeverity>(), Ok(IssueSeverity::Minor));
    }
}
