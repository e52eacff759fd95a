//! Issue (non-conformance report) lifecycle.
//!
//! # State Transition Diagram
//!
//! ```text
//! raise() → Open ── respond() → Investigating ──┬── review(Accept) ──→ Rectification ── rectify() → Verification ── close() → Closed / ClosedConcession
//!                                               ├── review(RequestRevision) → Investigating (non-advancing)
//!                                               └── review(Escalate) ─→ Escalated (terminal here)
//! ```
//!
//! Severity policy: major issues always pass through explicit QM review;
//! whether minor issues may skip it is a configurable policy, not an
//! inferred behavior.

use crate::{
    EntityId, EntityType, Issue, IssueSeverity, IssueStatus, ReviewAction, Timestamp,
    WorkflowError, WorkflowResult,
};
use serde::{Deserialize, Serialize};

/// Configurable review policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewPolicy {
    /// When set, responding to a minor issue advances it straight to
    /// rectification without an explicit QM review step.
    pub auto_accept_minor: bool,
    /// When set, the Escalate review action is allowed on minor issues.
    /// By default escalation is reserved for major severity.
    pub allow_minor_escalation: bool,
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self {
            auto_accept_minor: false,
            allow_minor_escalation: false,
        }
    }
}

/// Outcome of a rectification submission.
///
/// Missing evidence is a validation warning, not a hard error: the notes are
/// recorded and the issue stays in rectification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum RectifyOutcome {
    AdvancedToVerification,
    AwaitingEvidence,
}

impl Issue {
    /// Create a new issue in `Open`.
    #[allow(clippy::too_many_arguments)]
    pub fn raise(
        issue_id: EntityId,
        lot_id: EntityId,
        raised_by: String,
        description: String,
        category: String,
        severity: IssueSeverity,
        due_date: Option<Timestamp>,
        affected_lot_ids: Vec<EntityId>,
        now: Timestamp,
    ) -> Self {
        Self {
            issue_id,
            lot_id,
            raised_by,
            description,
            category,
            severity,
            status: IssueStatus::Open,
            due_date,
            affected_lot_ids,
            root_cause: None,
            proposed_action: None,
            qm_review_comments: None,
            revision_requested: false,
            revision_count: 0,
            rectification_notes: None,
            evidence_refs: Vec::new(),
            verification_notes: None,
            lessons_learned: None,
            escalated_to: None,
            escalation_reason: None,
            escalated_at: None,
            created_at: now,
            closed_at: None,
        }
    }

    /// Open → Investigating (or straight to Rectification for minor issues
    /// under an auto-accept policy). Also accepts a revised response while
    /// investigating after a revision request.
    pub fn respond(
        &mut self,
        root_cause: String,
        proposed_action: String,
        policy: ReviewPolicy,
    ) -> WorkflowResult<()> {
        let revising = self.status == IssueStatus::Investigating && self.revision_requested;
        if self.status != IssueStatus::Open && !revising {
            return Err(WorkflowError::invalid_transition(
                EntityType::Issue,
                self.issue_id,
                format!("cannot respond to a {} issue", self.status),
            ));
        }
        self.root_cause = Some(root_cause);
        self.proposed_action = Some(proposed_action);
        self.revision_requested = false;

        if policy.auto_accept_minor && self.severity == IssueSeverity::Minor {
            self.status = IssueStatus::Rectification;
        } else {
            self.status = IssueStatus::Investigating;
        }
        Ok(())
    }

    /// QM review of an investigating issue.
    pub fn qm_review(
        &mut self,
        action: ReviewAction,
        comments: Option<String>,
        escalated_to: Option<String>,
        policy: ReviewPolicy,
        now: Timestamp,
    ) -> WorkflowResult<()> {
        if self.status != IssueStatus::Investigating {
            return Err(WorkflowError::invalid_transition(
                EntityType::Issue,
                self.issue_id,
                format!("cannot review a {} issue", self.status),
            ));
        }
        match action {
            ReviewAction::Accept => {
                self.qm_review_comments = comments;
                self.status = IssueStatus::Rectification;
            }
            ReviewAction::RequestRevision => {
                // Non-advancing: the responsible party must respond again.
                self.qm_review_comments = comments;
                self.revision_requested = true;
                self.revision_count += 1;
            }
            ReviewAction::Escalate => {
                if self.severity == IssueSeverity::Minor && !policy.allow_minor_escalation {
                    return Err(WorkflowError::validation(
                        "severity",
                        "escalation is reserved for major issues",
                    ));
                }
                self.qm_review_comments = comments;
                self.escalated_to = escalated_to;
                self.escalation_reason = self.qm_review_comments.clone();
                self.escalated_at = Some(now);
                self.status = IssueStatus::Escalated;
            }
        }
        Ok(())
    }

    /// Submit corrective evidence. Advances to verification only once at
    /// least one evidence item is attached (across this and prior
    /// submissions); otherwise the notes are kept and the caller receives
    /// `AwaitingEvidence`.
    pub fn rectify(
        &mut self,
        notes: String,
        evidence_refs: Vec<String>,
    ) -> WorkflowResult<RectifyOutcome> {
        if self.status != IssueStatus::Rectification {
            return Err(WorkflowError::invalid_transition(
                EntityType::Issue,
                self.issue_id,
                format!("cannot rectify a {} issue", self.status),
            ));
        }
        self.rectification_notes = Some(notes);
        self.evidence_refs.extend(evidence_refs);

        if self.evidence_refs.is_empty() {
            return Ok(RectifyOutcome::AwaitingEvidence);
        }
        self.status = IssueStatus::Verification;
        Ok(RectifyOutcome::AdvancedToVerification)
    }

    /// Verification → Closed (or ClosedConcession for accepted-as-is).
    pub fn close(
        &mut self,
        verification_notes: String,
        lessons_learned: Option<String>,
        concession: bool,
        now: Timestamp,
    ) -> WorkflowResult<()> {
        if self.status != IssueStatus::Verification {
            return Err(WorkflowError::invalid_transition(
                EntityType::Issue,
                self.issue_id,
                format!("cannot close a {} issue", self.status),
            ));
        }
        self.verification_notes = Some(verification_notes);
        self.lessons_learned = lessons_learned;
        self.status = if concession {
            IssueStatus::ClosedConcession
        } else {
            IssueStatus::Closed
        };
        self.closed_at = Some(now);
        Ok(())
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

    fn raise_issue(severity: IssueSeverity) -> Issue {
        Issue::raise(
            new_entity_id(),
            new_entity_id(),
            "inspector@example.com".to_string(),
            "Honeycombing on south wall".to_string(),
            "workmanship".to_string(),
            severity,
            None,
            vec![],
            Utc::now(),
        )
    }

    fn respond(issue: &mut Issue, policy: ReviewPolicy) {
        issue
            .respond(
                "Vibration missed during pour".to_string(),
                "Grout repair per spec".to_string(),
                policy,
            )
            .unwrap();
    }

    #[test]
    fn test_full_lifecycle_to_closed() {
        let policy = ReviewPolicy::default();
        let mut issue = raise_issue(IssueSeverity::Major);
        assert_eq!(issue.status, IssueStatus::Open);

        respond(&mut issue, policy);
        assert_eq!(issue.status, IssueStatus::Investigating);

        issue
            .qm_review(ReviewAction::Accept, Some("ok".to_string()), None, policy, Utc::now())
            .unwrap();
        assert_eq!(issue.status, IssueStatus::Rectification);

        let outcome = issue
            .rectify("Repaired and cured".to_string(), vec!["photo-1".to_string()])
            .unwrap();
        assert_eq!(outcome, RectifyOutcome::AdvancedToVerification);
        assert_eq!(issue.status, IssueStatus::Verification);

        issue
            .close("Verified on site".to_string(), Some("Add vibration checklist".to_string()), false, Utc::now())
            .unwrap();
        assert_eq!(issue.status, IssueStatus::Closed);
        assert!(issue.closed_at.is_some());
    }

    #[test]
    fn test_respond_from_wrong_state_conflicts() {
        let policy = ReviewPolicy::default();
        let mut issue = raise_issue(IssueSeverity::Minor);
        respond(&mut issue, policy);
        // Already investigating with no revision requested: a second
        // response is a Conflict, not an overwrite.
        let err = issue
            .respond("x".to_string(), "y".to_string(), policy)
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    }

    #[test]
    fn test_revision_request_does_not_advance() {
        let policy = ReviewPolicy::default();
        let mut issue = raise_issue(IssueSeverity::Major);
        respond(&mut issue, policy);

        issue
            .qm_review(
                ReviewAction::RequestRevision,
                Some("root cause too shallow".to_string()),
                None,
                policy,
                Utc::now(),
            )
            .unwrap();
        assert_eq!(issue.status, IssueStatus::Investigating);
        assert!(issue.revision_requested);
        assert_eq!(issue.revision_count, 1);

        // Revised response is accepted and clears the flag.
        respond(&mut issue, policy);
        assert_eq!(issue.status, IssueStatus::Investigating);
        assert!(!issue.revision_requested);
        assert_eq!(issue.revision_count, 1);
    }

    #[test]
    fn test_minor_escalation_rejected_by_default_policy() {
        let policy = ReviewPolicy::default();
        let mut issue = raise_issue(IssueSeverity::Minor);
        respond(&mut issue, policy);

        let err = issue
            .qm_review(ReviewAction::Escalate, None, Some("director".to_string()), policy, Utc::now())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation { .. }));
        assert_eq!(issue.status, IssueStatus::Investigating);
    }

    #[test]
    fn test_minor_escalation_allowed_when_policy_permits() {
        let policy = ReviewPolicy {
            allow_minor_escalation: true,
            ..ReviewPolicy::default()
        };
        let mut issue = raise_issue(IssueSeverity::Minor);
        respond(&mut issue, policy);
        issue
            .qm_review(
                ReviewAction::Escalate,
                Some("repeat offence".to_string()),
                Some("director".to_string()),
                policy,
                Utc::now(),
            )
            .unwrap();
        assert_eq!(issue.status, IssueStatus::Escalated);
        assert!(issue.escalated_at.is_some());
        assert_eq!(issue.escalated_to.as_deref(), Some("director"));
    }

    #[test]
    fn test_major_escalation_allowed() {
        let policy = ReviewPolicy::default();
        let mut issue = raise_issue(IssueSeverity::Major);
        respond(&mut issue, policy);
        issue
            .qm_review(ReviewAction::Escalate, Some("structural".to_string()), Some("dir".to_string()), policy, Utc::now())
            .unwrap();
        assert_eq!(issue.status, IssueStatus::Escalated);
        // Escalated is terminal for the review machine.
        assert!(issue
            .qm_review(ReviewAction::Accept, None, None, policy, Utc::now())
            .is_err());
    }

    #[test]
    fn test_auto_accept_minor_skips_review() {
        let policy = ReviewPolicy {
            auto_accept_minor: true,
            ..ReviewPolicy::default()
        };
        let mut issue = raise_issue(IssueSeverity::Minor);
        respond(&mut issue, policy);
        assert_eq!(issue.status, IssueStatus::Rectification);

        // Major issues still require the review step under the same policy.
        let mut major = raise_issue(IssueSeverity::Major);
        respond(&mut major, policy);
        assert_eq!(major.status, IssueStatus::Investigating);
    }

    #[test]
    fn test_rectify_without_evidence_waits() {
        let policy = ReviewPolicy::default();
        let mut issue = raise_issue(IssueSeverity::Major);
        respond(&mut issue, policy);
        issue
            .qm_review(ReviewAction::Accept, None, None, policy, Utc::now())
            .unwrap();

        let outcome = issue.rectify("work done, photos to follow".to_string(), vec![]).unwrap();
        assert_eq!(outcome, RectifyOutcome::AwaitingEvidence);
        assert_eq!(issue.status, IssueStatus::Rectification);
        assert!(issue.rectification_notes.is_some());

        // Evidence arrives on a later submission.
        let outcome = issue
            .rectify("photos attached".to_string(), vec!["photo-2".to_string()])
            .unwrap();
        assert_eq!(outcome, RectifyOutcome::AdvancedToVerification);
    }

    #[test]
    fn test_close_requires_verification_state() {
        let policy = ReviewPolicy::default();
        let mut issue = raise_issue(IssueSeverity::Major);
        let err = issue
            .close("n/a".to_string(), None, false, Utc::now())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
        assert_eq!(issue.status, IssueStatus::Open);
        let _ = policy;
    }

    #[test]
    fn test_close_concession_variant() {
        let policy = ReviewPolicy::default();
        let mut issue = raise_issue(IssueSeverity::Minor);
        respond(&mut issue, policy);
        issue
            .qm_review(ReviewAction::Accept, None, None, policy, Utc::now())
            .unwrap();
        issue.rectify("accepted as-is".to_string(), vec!["memo-1".to_string()]).unwrap();
        issue
            .close("accepted by engineer".to_string(), None, true, Utc::now())
            .unwrap();
        assert_eq!(issue.status, IssueStatus::ClosedConcession);
        assert!(issue.status.is_closed());
    }
}
