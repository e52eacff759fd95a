//! Release Token Service
//!
//! The external release gateway: issues bearer tokens for checkpoints,
//! previews them for the recipient, and consumes them atomically.
//!
//! Secret handling: 32 bytes from the OS CSPRNG, base64url-encoded. The
//! raw secret appears exactly once, in the issuance response; storage and
//! logs only ever see its SHA-256 digest. Lookups hash the presented
//! secret and match on the digest, so failures cannot reveal whether a
//! near-matching secret exists.

use crate::db::DbClient;
use crate::error::{ApiError, ApiResult};
use crate::events::{notify, NotificationEvent, Notifier};
use crate::services::instance_checklist;
use crate::types::{ExternalReleaseRequest, IssueTokenRequest, IssueTokenResponse, TokenPreviewResponse};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use lotgate_core::{
    compute_content_hash, Checkpoint, CheckpointStatus, EntityId, ReleaseAttribution,
    ReleaseMethod, SnapshotItem,
};
use rand::rngs::OsRng;
use rand::TryRngCore;

/// Raw entropy per token secret.
const SECRET_BYTES: usize = 32;

/// Generate a fresh bearer secret from the OS CSPRNG.
fn generate_secret() -> ApiResult<String> {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| ApiError::internal_error(format!("entropy source failed: {}", e)))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Hex SHA-256 digest of a presented secret; the only form ever stored.
pub fn digest_secret(secret: &str) -> String {
    hex::encode(compute_content_hash(secret.as_bytes()))
}

/// Issue a release token for a notified checkpoint.
///
/// Any previously live token for the checkpoint is superseded in the same
/// transaction, so a re-sent link invalidates the old one.
pub async fn issue_token(
    db: &DbClient,
    notifier: &Notifier,
    checkpoint_id: EntityId,
    req: IssueTokenRequest,
    default_ttl: Duration,
) -> ApiResult<IssueTokenResponse> {
    if !req.recipient_email.contains('@') {
        return Err(ApiError::invalid_input("recipient_email is not an email address"));
    }
    if req.recipient_name.trim().is_empty() {
        return Err(ApiError::missing_field("recipient_name"));
    }
    let ttl = match req.ttl_hours {
        Some(h) if h <= 0 => return Err(ApiError::invalid_range("ttl_hours", 1, i64::MAX)),
        Some(h) => Duration::hours(h),
        None => default_ttl,
    };

    let checkpoint = db
        .checkpoint_get(checkpoint_id)
        .await?
        .ok_or_else(|| ApiError::checkpoint_not_found(checkpoint_id))?;
    if checkpoint.status != CheckpointStatus::Notified {
        return Err(ApiError::state_conflict(format!(
            "tokens can only be issued for a notified checkpoint, not {}",
            checkpoint.status
        )));
    }

    let secret = generate_secret()?;
    let expires_at = Utc::now() + ttl;
    let token = db
        .token_issue(
            checkpoint_id,
            &digest_secret(&secret),
            &req.recipient_email,
            &req.recipient_name,
            expires_at,
        )
        .await?;

    notify(
        notifier,
        NotificationEvent::ReleaseTokenIssued {
            token_id: token.token_id,
            checkpoint_id: token.checkpoint_id,
            recipient_email: token.recipient_email.clone(),
            recipient_name: token.recipient_name.clone(),
            expires_at: token.expires_at,
        },
    );

    Ok(IssueTokenResponse {
        token_id: token.token_id,
        checkpoint_id: token.checkpoint_id,
        secret,
        recipient_email: token.recipient_email,
        expires_at: token.expires_at,
    })
}

/// Preview what a release link points at, without consuming it.
///
/// Dead tokens collapse to two responses: unknown or superseded secrets are
/// NotFound, used or expired ones are Gone. Nothing distinguishes "never
/// existed" from "revoked" to a probing caller.
pub async fn preview_token(db: &DbClient, secret: &str) -> ApiResult<TokenPreviewResponse> {
    let token = db
        .token_get_by_digest(&digest_secret(secret))
        .await?
        .ok_or_else(ApiError::token_not_found)?;

    if token.superseded_at.is_some() {
        return Err(ApiError::token_not_found());
    }
    if !token.is_live(Utc::now()) {
        return Err(ApiError::token_expired());
    }

    let checkpoint = db
        .checkpoint_get(token.checkpoint_id)
        .await?
        .ok_or_else(ApiError::token_not_found)?;
    let lot = db
        .lot_get(checkpoint.lot_id)
        .await?
        .ok_or_else(ApiError::token_not_found)?;
    let (item, evidence_refs) = evidence_for_checkpoint(db, &checkpoint).await?;

    Ok(TokenPreviewResponse {
        checkpoint,
        project_id: lot.project_id,
        lot_name: lot.name,
        item,
        evidence_refs,
        recipient_name: token.recipient_name,
        expires_at: token.expires_at,
    })
}

/// Snapshot item and attached evidence for the checkpoint's originating
/// checklist item. The external recipient gets only what a release decision
/// needs; a missing instance or item degrades to an empty package.
async fn evidence_for_checkpoint(
    db: &DbClient,
    checkpoint: &Checkpoint,
) -> ApiResult<(Option<SnapshotItem>, Vec<String>)> {
    let Some(instance) = db.instance_get_by_lot(checkpoint.lot_id).await? else {
        return Ok((None, Vec::new()));
    };
    let (items, _) = instance_checklist(db, &instance).await?;
    let item = items.into_iter().find(|i| i.item_id == checkpoint.item_id);
    let evidence_refs = db
        .completions_for_instance(instance.instance_id)
        .await?
        .into_iter()
        .find(|c| c.item_id == checkpoint.item_id)
        .map(|c| c.evidence_refs)
        .unwrap_or_default();
    Ok((item, evidence_refs))
}

/// Consume a token and release its checkpoint in one transaction.
///
/// Exactly-once: the expiry/unused check and the used_at write are a single
/// conditional UPDATE, and a failed checkpoint release rolls the consumption
/// back so the link still works after a transient conflict.
pub async fn consume_token(
    db: &DbClient,
    notifier: &Notifier,
    secret: &str,
    req: ExternalReleaseRequest,
) -> ApiResult<Checkpoint> {
    if req.released_by_name.trim().is_empty() {
        return Err(ApiError::missing_field("released_by_name"));
    }

    let attribution = ReleaseAttribution {
        released_by_name: req.released_by_name,
        released_by_org: req.released_by_org,
        release_notes: req.release_notes,
        release_method: ReleaseMethod::ExternalToken,
    };

    let (_token, checkpoint) = db
        .token_consume_and_release(&digest_secret(secret), &attribution)
        .await?;

    notify(
        notifier,
        NotificationEvent::CheckpointReleased {
            checkpoint_id: checkpoint.checkpoint_id,
            lot_id: checkpoint.lot_id,
            released_by: attribution.released_by_name.clone(),
        },
    );
    Ok(checkpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_secrets_are_unique_and_urlsafe() {
        let a = generate_secret().unwrap();
        let b = generate_secret().unwrap();
        assert_ne!(a, b);
        // 32 bytes -> 43 base64url chars, no padding
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_digest_is_stable_and_hex() {
        let d1 = digest_secret("some-secret");
        let d2 = digest_secret("some-secret");
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 64);
        assert_ne!(d1, digest_secret("some-secret-2"));
    }

    #[test]
    fn test_digest_does_not_contain_secret() {
        let secret = "super-sensitive-token-secret";
        assert!(!digest_secret(secret).contains(secret));
    }
}
