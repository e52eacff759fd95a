#![cfg(feature = "db-tests")]
//! End-to-end workflow smoke tests against a real database.
//!
//! Covers the full hold-point path (complete -> spawn -> notify -> token ->
//! external release) and the issue path (raise -> respond -> review ->
//! rectify -> close), asserting the derived lot status at each step.

use chrono::{Duration, Utc};
use lotgate_api::services;
use lotgate_api::types::{
    ExternalReleaseRequest, IssueTokenRequest, RaiseIssueRequest, RecordCompletionRequest,
};
use lotgate_api::{DbClient, Notifier, TracingNotifier};
use lotgate_core::{
    ChecklistItem, CheckpointStatus, CompletionStatus, IssueSeverity, IssueStatus, LotStatus,
    PointType, ReviewAction, ReviewPolicy,
};
use std::sync::Arc;
use uuid::Uuid;

#[path = "support/db.rs"]
mod test_db_support;
use test_db_support::test_db_client;

fn notifier() -> Notifier {
    Arc::new(TracingNotifier)
}

fn sample_items() -> Vec<ChecklistItem> {
    let template_id = lotgate_core::new_entity_id();
    let item = |sequence: i32, point_type: PointType, evidence: bool| ChecklistItem {
        item_id: lotgate_core::new_entity_id(),
        template_id,
        sequence,
        description: format!("Step {}", sequence),
        point_type,
        responsible_party: "contractor".to_string(),
        evidence_required: evidence,
        acceptance_criteria: None,
    };
    vec![
        item(1, PointType::Standard, false),
        item(2, PointType::Witness, false),
        item(3, PointType::Hold, false),
    ]
}

async fn setup_lot_with_instance(
    db: &DbClient,
) -> (lotgate_core::Lot, lotgate_core::InspectionInstance, Vec<lotgate_core::SnapshotItem>) {
    let (template, _items) = db
        .template_create("Concrete pour ITP", "concrete", &sample_items())
        .await
        .expect("template");
    let lot = db
        .lot_create(Uuid::now_v7(), "Pour 12 - South wall", LotStatus::InProgress)
        .await
        .expect("lot");
    let instance = services::create_instance(db, lot.lot_id, template.template_id)
        .await
        .expect("instance");
    let (items, _) = services::instance_checklist(db, &instance)
        .await
        .expect("checklist");
    (lot, instance, items)
}

#[tokio::test]
async fn test_hold_point_lifecycle_via_external_token() {
    let db = test_db_client();
    let (lot, instance, items) = setup_lot_with_instance(&db).await;
    let hold_item = items.iter().find(|i| i.is_hold_point).unwrap();

    // Completing the hold point spawns a checkpoint and blocks the lot.
    let completion = services::record_completion(
        &db,
        &instance,
        RecordCompletionRequest {
            item_id: hold_item.item_id,
            status: CompletionStatus::Completed,
            verification: None,
            completed_by: Some("foreman@example.com".to_string()),
            evidence_refs: vec!["s3://evidence/pour12/rebar.jpg".to_string()],
        },
    )
    .await
    .expect("completion");
    let checkpoint = completion.spawned_checkpoint.expect("checkpoint spawned");
    assert_eq!(checkpoint.status, CheckpointStatus::Pending);

    let lot_now = db.lot_get(lot.lot_id).await.unwrap().unwrap();
    assert_eq!(lot_now.status, LotStatus::OnHold);

    // Completing it again does not spawn a second live checkpoint.
    let again = services::record_completion(
        &db,
        &instance,
        RecordCompletionRequest {
            item_id: hold_item.item_id,
            status: CompletionStatus::Completed,
            verification: None,
            completed_by: None,
            evidence_refs: vec!["s3://evidence/pour12/rebar.jpg".to_string()],
        },
    )
    .await
    .expect("re-completion");
    assert!(again.spawned_checkpoint.is_none());

    // Notify, then release through the external gateway.
    let notified = db.checkpoint_notify(checkpoint.checkpoint_id).await.unwrap();
    assert_eq!(notified.status, CheckpointStatus::Notified);
    // notify is idempotent
    let renotified = db.checkpoint_notify(checkpoint.checkpoint_id).await.unwrap();
    assert_eq!(
        renotified.notification_sent_at,
        notified.notification_sent_at
    );

    let issued = services::issue_token(
        &db,
        &notifier(),
        checkpoint.checkpoint_id,
        IssueTokenRequest {
            recipient_email: "inspector@authority.example".to_string(),
            recipient_name: "A. Inspector".to_string(),
            ttl_hours: None,
        },
        Duration::hours(72),
    )
    .await
    .expect("token issued");

    let preview = services::preview_token(&db, &issued.secret).await.expect("preview");
    assert_eq!(preview.checkpoint.checkpoint_id, checkpoint.checkpoint_id);
    assert_eq!(preview.lot_name, "Pour 12 - South wall");
    let preview_item = preview.item.expect("snapshot item in evidence package");
    assert_eq!(preview_item.item_id, checkpoint.item_id);
    assert!(preview_item.is_hold_point);
    assert_eq!(
        preview.evidence_refs,
        vec!["s3://evidence/pour12/rebar.jpg".to_string()]
    );

    let released = services::consume_token(
        &db,
        &notifier(),
        &issued.secret,
        ExternalReleaseRequest {
            released_by_name: "A. Inspector".to_string(),
            released_by_org: Some("Highways Authority".to_string()),
            release_notes: None,
        },
    )
    .await
    .expect("release");
    assert_eq!(released.status, CheckpointStatus::Released);
    let attribution = released.release.expect("attribution recorded");
    assert_eq!(attribution.released_by_name, "A. Inspector");

    // Lot reverts to its resting status in the same transaction.
    let lot_after = db.lot_get(lot.lot_id).await.unwrap().unwrap();
    assert_eq!(lot_after.status, LotStatus::InProgress);

    // The token is single-use.
    let second = services::consume_token(
        &db,
        &notifier(),
        &issued.secret,
        ExternalReleaseRequest {
            released_by_name: "A. Inspector".to_string(),
            released_by_org: None,
            release_notes: None,
        },
    )
    .await;
    assert!(second.is_err());
}

#[tokio::test]
async fn test_superseded_token_is_dead() {
    let db = test_db_client();
    let (_lot, instance, items) = setup_lot_with_instance(&db).await;
    let hold_item = items.iter().find(|i| i.is_hold_point).unwrap();

    let completion = services::record_completion(
        &db,
        &instance,
        RecordCompletionRequest {
            item_id: hold_item.item_id,
            status: CompletionStatus::Completed,
            verification: None,
            completed_by: None,
            evidence_refs: vec![],
        },
    )
    .await
    .unwrap();
    let checkpoint = completion.spawned_checkpoint.unwrap();
    db.checkpoint_notify(checkpoint.checkpoint_id).await.unwrap();

    let first = services::issue_token(
        &db,
        &notifier(),
        checkpoint.checkpoint_id,
        IssueTokenRequest {
            recipient_email: "inspector@authority.example".to_string(),
            recipient_name: "A. Inspector".to_string(),
            ttl_hours: Some(1),
        },
        Duration::hours(72),
    )
    .await
    .unwrap();
    let second = services::issue_token(
        &db,
        &notifier(),
        checkpoint.checkpoint_id,
        IssueTokenRequest {
            recipient_email: "inspector@authority.example".to_string(),
            recipient_name: "A. Inspector".to_string(),
            ttl_hours: Some(1),
        },
        Duration::hours(72),
    )
    .await
    .unwrap();

    // The first link no longer resolves; the second one works.
    assert!(services::preview_token(&db, &first.secret).await.is_err());
    assert!(services::preview_token(&db, &second.secret).await.is_ok());
}

#[tokio::test]
async fn test_issue_lifecycle_drives_lot_status() {
    let db = test_db_client();
    let n = notifier();
    let (lot, _instance, _items) = setup_lot_with_instance(&db).await;
    let policy = ReviewPolicy::default();

    let issue = services::raise_issue(
        &db,
        &n,
        lot.lot_id,
        RaiseIssueRequest {
            raised_by: "inspector@example.com".to_string(),
            description: "Honeycombing on south wall".to_string(),
            category: "workmanship".to_string(),
            severity: IssueSeverity::Major,
            due_date: Some(Utc::now() + Duration::days(7)),
            affected_lot_ids: vec![],
        },
    )
    .await
    .expect("issue raised");
    assert_eq!(issue.status, IssueStatus::Open);

    let blocked = db.lot_get(lot.lot_id).await.unwrap().unwrap();
    assert_eq!(blocked.status, LotStatus::IssueRaised);

    // Respond, review with a revision request (non-advancing), re-respond.
    let issue = services::respond_to_issue(
        &db,
        &n,
        issue,
        lotgate_api::types::RespondIssueRequest {
            root_cause: "Insufficient vibration".to_string(),
            proposed_action: "Break out and recast".to_string(),
        },
        policy,
    )
    .await
    .unwrap();
    assert_eq!(issue.status, IssueStatus::Investigating);

    let issue = services::review_issue(
        &db,
        &n,
        issue,
        lotgate_api::types::ReviewIssueRequest {
            action: ReviewAction::RequestRevision,
            comments: Some("Root cause analysis is too thin".to_string()),
            escalated_to: None,
        },
        policy,
    )
    .await
    .unwrap();
    assert_eq!(issue.status, IssueStatus::Investigating);
    assert_eq!(issue.revision_count, 1);
    assert!(issue.revision_requested);

    let issue = services::respond_to_issue(
        &db,
        &n,
        issue,
        lotgate_api::types::RespondIssueRequest {
            root_cause: "Vibrator failure during pour, no standby unit".to_string(),
            proposed_action: "Break out and recast with standby vibrator on site".to_string(),
        },
        policy,
    )
    .await
    .unwrap();
    assert!(!issue.revision_requested);

    let issue = services::review_issue(
        &db,
        &n,
        issue,
        lotgate_api::types::ReviewIssueRequest {
            action: ReviewAction::Accept,
            comments: None,
            escalated_to: None,
        },
        policy,
    )
    .await
    .unwrap();
    assert_eq!(issue.status, IssueStatus::Rectification);

    // Evidence-free rectification does not advance.
    let (issue, outcome) = services::rectify_issue(
        &db,
        &n,
        issue,
        lotgate_api::types::RectifyIssueRequest {
            notes: Some("Recast complete, awaiting photos".to_string()),
            evidence_refs: vec![],
        },
    )
    .await
    .unwrap();
    assert_eq!(outcome, lotgate_core::RectifyOutcome::AwaitingEvidence);
    assert_eq!(issue.status, IssueStatus::Rectification);

    let (issue, outcome) = services::rectify_issue(
        &db,
        &n,
        issue,
        lotgate_api::types::RectifyIssueRequest {
            notes: Some("Photos attached".to_string()),
            evidence_refs: vec!["photo://recast-1.jpg".to_string()],
        },
    )
    .await
    .unwrap();
    assert_eq!(outcome, lotgate_core::RectifyOutcome::AdvancedToVerification);
    assert_eq!(issue.status, IssueStatus::Verification);

    // Still blocked until closure.
    let still_blocked = db.lot_get(lot.lot_id).await.unwrap().unwrap();
    assert_eq!(still_blocked.status, LotStatus::IssueRaised);

    let issue = services::close_issue(
        &db,
        &n,
        issue,
        lotgate_api::types::CloseIssueRequest {
            verification_notes: Some("Recast verified on site".to_string()),
            lessons_learned: None,
            concession: false,
        },
    )
    .await
    .unwrap();
    assert_eq!(issue.status, IssueStatus::Closed);
    assert!(issue.closed_at.is_some());

    let unblocked = db.lot_get(lot.lot_id).await.unwrap().unwrap();
    assert_eq!(unblocked.status, LotStatus::InProgress);
}

#[tokio::test]
async fn test_project_membership_gates_access() {
    use lotgate_api::{AccessChecker, DbAccessChecker};

    let db = test_db_client();
    let project_id = Uuid::now_v7();
    let checker = DbAccessChecker::new(db.clone());

    assert!(!checker
        .is_member("site-engineer", project_id)
        .await
        .unwrap());

    db.project_member_add(project_id, "site-engineer")
        .await
        .unwrap();
    // Idempotent
    db.project_member_add(project_id, "site-engineer")
        .await
        .unwrap();

    assert!(checker
        .is_member("site-engineer", project_id)
        .await
        .unwrap());
    assert!(!checker.is_member("outsider", project_id).await.unwrap());
}

#[tokio::test]
async fn test_issue_outranks_checkpoint_in_derived_status() {
    let db = test_db_client();
    let n = notifier();
    let (lot, instance, items) = setup_lot_with_instance(&db).await;
    let hold_item = items.iter().find(|i| i.is_hold_point).unwrap();

    services::record_completion(
        &db,
        &instance,
        RecordCompletionRequest {
            item_id: hold_item.item_id,
            status: CompletionStatus::Completed,
            verification: None,
            completed_by: None,
            evidence_refs: vec![],
        },
    )
    .await
    .unwrap();
    assert_eq!(
        db.lot_get(lot.lot_id).await.unwrap().unwrap().status,
        LotStatus::OnHold
    );

    services::raise_issue(
        &db,
        &n,
        lot.lot_id,
        RaiseIssueRequest {
            raised_by: "inspector@example.com".to_string(),
            description: "Formwork deflection".to_string(),
            category: "workmanship".to_string(),
            severity: IssueSeverity::Minor,
            due_date: None,
            affected_lot_ids: vec![],
        },
    )
    .await
    .unwrap();

    // Issues take precedence over checkpoints.
    assert_eq!(
        db.lot_get(lot.lot_id).await.unwrap().unwrap().status,
        LotStatus::IssueRaised
    );
}
