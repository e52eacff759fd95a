//! Inspection Instance Service
//!
//! Template instantiation (snapshot freezing), progress views, and
//! completion recording with hold-point checkpoint spawning.

use crate::db::DbClient;
use crate::error::{ApiError, ApiResult};
use crate::types::{
    InstanceProgressResponse, ItemProgressView, RecordCompletionRequest, RecordCompletionResponse,
};
use lotgate_core::{
    CompletionStatus, EntityId, InspectionInstance, SnapshotItem, SnapshotSource,
    TemplateSnapshot, VerificationStatus,
};
use std::collections::HashMap;

/// Instantiate a template against a lot, freezing the checklist snapshot.
///
/// The snapshot is taken from the template AS IT IS NOW and becomes the
/// instance's permanent checklist; later template edits never reach it.
pub async fn create_instance(
    db: &DbClient,
    lot_id: EntityId,
    template_id: EntityId,
) -> ApiResult<InspectionInstance> {
    let (template, items) = db
        .template_get(template_id)
        .await?
        .ok_or_else(|| ApiError::template_not_found(template_id))?;

    if items.is_empty() {
        return Err(ApiError::validation_failed(
            "cannot instantiate a template with no checklist items",
        ));
    }

    let snapshot = TemplateSnapshot::freeze(&template, &items);
    let blob = snapshot.to_blob()?;
    db.instance_create(lot_id, template_id, &blob).await
}

/// The checklist an instance is inspected against, and where it came from.
///
/// Instances created before snapshotting existed fall back to the live
/// template; the source marker tells the caller which one they got.
pub async fn instance_checklist(
    db: &DbClient,
    instance: &InspectionInstance,
) -> ApiResult<(Vec<SnapshotItem>, SnapshotSource)> {
    match &instance.snapshot {
        Some(blob) => {
            let snapshot = TemplateSnapshot::from_blob(blob)?;
            Ok((snapshot.items, SnapshotSource::Snapshot))
        }
        None => {
            let (template, items) = db
                .template_get(instance.template_id)
                .await?
                .ok_or_else(|| ApiError::template_not_found(instance.template_id))?;
            let live = TemplateSnapshot::freeze(&template, &items);
            Ok((live.items, SnapshotSource::LiveTemplate))
        }
    }
}

/// Full progress view: checklist merged with completion records.
pub async fn instance_progress(
    db: &DbClient,
    instance: InspectionInstance,
) -> ApiResult<InstanceProgressResponse> {
    let (items, source) = instance_checklist(db, &instance).await?;
    let completions = db.completions_for_instance(instance.instance_id).await?;
    let mut by_item: HashMap<EntityId, _> = completions
        .into_iter()
        .map(|c| (c.item_id, c))
        .collect();

    let items = items
        .into_iter()
        .map(|item| {
            let completion = by_item.remove(&item.item_id);
            ItemProgressView {
                item_id: item.item_id,
                sequence: item.sequence,
                description: item.description,
                point_type: item.point_type,
                responsible_party: item.responsible_party,
                evidence_required: item.evidence_required,
                acceptance_criteria: item.acceptance_criteria,
                completion,
            }
        })
        .collect();

    Ok(InstanceProgressResponse {
        instance,
        source,
        items,
    })
}

/// Record a completion for one checklist item.
///
/// Completing a hold point spawns a checkpoint (unless a live one already
/// exists for the pair) and immediately blocks the lot via the in-transaction
/// status sync. The spawned checkpoint comes back Pending; notifying the
/// release authority is a separate, explicit step.
pub async fn record_completion(
    db: &DbClient,
    instance: &InspectionInstance,
    req: RecordCompletionRequest,
) -> ApiResult<RecordCompletionResponse> {
    let (items, _) = instance_checklist(db, instance).await?;
    let item = items
        .iter()
        .find(|i| i.item_id == req.item_id)
        .ok_or_else(|| {
            ApiError::validation_failed(format!(
                "item {} is not part of this instance's checklist",
                req.item_id
            ))
        })?;

    if req.status == CompletionStatus::Completed
        && item.evidence_required
        && req.evidence_refs.is_empty()
    {
        return Err(ApiError::validation_failed(
            "this item requires evidence to be marked completed",
        ));
    }

    // Witness points default into the verification queue on completion.
    let verification = req.verification.unwrap_or({
        if item.is_witness_point && req.status == CompletionStatus::Completed {
            VerificationStatus::PendingVerification
        } else {
            VerificationStatus::None
        }
    });

    let record = db
        .completion_upsert(
            instance.instance_id,
            req.item_id,
            req.status,
            verification,
            req.completed_by.as_deref(),
            &req.evidence_refs,
        )
        .await?;

    let spawned_checkpoint = if item.is_hold_point && req.status == CompletionStatus::Completed {
        db.checkpoint_create_if_absent(instance.lot_id, req.item_id)
            .await?
    } else {
        None
    };

    Ok(RecordCompletionResponse {
        record,
        spawned_checkpoint,
    })
}
