//! Issue Service
//!
//! Applies the pure issue state machine from lotgate-core and persists the
//! result with a write conditioned on the status (and revision count) that
//! was read, so concurrent reviewers get a Conflict instead of a lost
//! update. Raising and closing run the lot status sync; the intermediate
//! transitions keep the issue in the open set and cannot change the derived
//! lot status.

use crate::db::DbClient;
use crate::error::{ApiError, ApiResult};
use crate::events::{notify, NotificationEvent, Notifier};
use crate::types::{
    CloseIssueRequest, RaiseIssueRequest, RectifyIssueRequest, RespondIssueRequest,
    ReviewIssueRequest,
};
use chrono::Utc;
use lotgate_core::{EntityId, Issue, RectifyOutcome, ReviewAction, ReviewPolicy};

/// Raise a new non-conformance issue against a lot.
pub async fn raise_issue(
    db: &DbClient,
    notifier: &Notifier,
    lot_id: EntityId,
    req: RaiseIssueRequest,
) -> ApiResult<Issue> {
    if req.description.trim().is_empty() {
        return Err(ApiError::missing_field("description"));
    }
    if req.raised_by.trim().is_empty() {
        return Err(ApiError::missing_field("raised_by"));
    }

    let issue = Issue::raise(
        lotgate_core::new_entity_id(),
        lot_id,
        req.raised_by,
        req.description,
        req.category,
        req.severity,
        req.due_date,
        req.affected_lot_ids,
        Utc::now(),
    );

    let created = db.issue_raise(&issue).await?;
    notify(
        notifier,
        NotificationEvent::IssueRaised {
            issue_id: created.issue_id,
            lot_id: created.lot_id,
            severity: created.severity,
            raised_by: created.raised_by.clone(),
        },
    );
    Ok(created)
}

/// Responsible party's root-cause response.
pub async fn respond_to_issue(
    db: &DbClient,
    notifier: &Notifier,
    mut issue: Issue,
    req: RespondIssueRequest,
    policy: ReviewPolicy,
) -> ApiResult<Issue> {
    if req.root_cause.trim().is_empty() {
        return Err(ApiError::missing_field("root_cause"));
    }
    if req.proposed_action.trim().is_empty() {
        return Err(ApiError::missing_field("proposed_action"));
    }

    let expected_status = issue.status;
    let expected_revisions = issue.revision_count;
    issue.respond(req.root_cause, req.proposed_action, policy)?;

    let updated = db
        .issue_persist_transition(&issue, expected_status, expected_revisions)
        .await?;
    notify_status(notifier, &updated);
    Ok(updated)
}

/// Quality-manager review verdict.
pub async fn review_issue(
    db: &DbClient,
    notifier: &Notifier,
    mut issue: Issue,
    req: ReviewIssueRequest,
    policy: ReviewPolicy,
) -> ApiResult<Issue> {
    if req.action == ReviewAction::Escalate && req.escalated_to.is_none() {
        return Err(ApiError::missing_field("escalated_to"));
    }

    let expected_status = issue.status;
    let expected_revisions = issue.revision_count;
    issue.qm_review(
        req.action,
        req.comments,
        req.escalated_to,
        policy,
        Utc::now(),
    )?;

    let updated = db
        .issue_persist_transition(&issue, expected_status, expected_revisions)
        .await?;

    if let (Some(escalated_to), Some(reason)) =
        (&updated.escalated_to, &updated.escalation_reason)
    {
        if updated.escalated_at.is_some() && req.action == ReviewAction::Escalate {
            notify(
                notifier,
                NotificationEvent::IssueEscalated {
                    issue_id: updated.issue_id,
                    lot_id: updated.lot_id,
                    escalated_to: escalated_to.clone(),
                    reason: reason.clone(),
                },
            );
        }
    }
    notify_status(notifier, &updated);
    Ok(updated)
}

/// Rectification evidence submission. The issue advances to verification
/// only once evidence is attached; a notes-only submission is accepted but
/// non-advancing.
pub async fn rectify_issue(
    db: &DbClient,
    notifier: &Notifier,
    mut issue: Issue,
    req: RectifyIssueRequest,
) -> ApiResult<(Issue, RectifyOutcome)> {
    let expected_status = issue.status;
    let expected_revisions = issue.revision_count;
    let outcome = issue.rectify(req.notes.unwrap_or_default(), req.evidence_refs)?;

    let updated = db
        .issue_persist_transition(&issue, expected_status, expected_revisions)
        .await?;
    if outcome == RectifyOutcome::AdvancedToVerification {
        notify_status(notifier, &updated);
    }
    Ok((updated, outcome))
}

/// Final verification and closure. Unblocks the lot in the same
/// transaction when this was its last open issue.
pub async fn close_issue(
    db: &DbClient,
    notifier: &Notifier,
    mut issue: Issue,
    req: CloseIssueRequest,
) -> ApiResult<Issue> {
    let expected_revisions = issue.revision_count;
    issue.close(
        req.verification_notes.unwrap_or_default(),
        req.lessons_learned,
        req.concession,
        Utc::now(),
    )?;

    let updated = db.issue_close(&issue, expected_revisions).await?;
    notify_status(notifier, &updated);
    Ok(updated)
}

fn notify_status(notifier: &Notifier, issue: &Issue) {
    notify(
        notifier,
        NotificationEvent::IssueStatusChanged {
            issue_id: issue.issue_id,
            lot_id: issue.lot_id,
            status: issue.status,
        },
    );
}
