//! Workflow Notification Events
//!
//! Outbound notifications emitted by workflow transitions: checkpoint
//! notify/chase/escalate, token issuance, issue lifecycle changes.
//!
//! Delivery is fire-and-forget by contract. A notification failure is
//! logged and dropped; it never rolls back the transition that caused it.
//! The database, not the notification channel, is the source of truth.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lotgate_core::{EntityId, IssueSeverity, IssueStatus};
use serde::Serialize;
use std::sync::Arc;

/// Events the workflow engine wants delivered to humans.
///
/// The token issuance event carries the recipient and expiry but NEVER the
/// secret; the secret exists only in the issuance HTTP response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    CheckpointAwaitingRelease {
        checkpoint_id: EntityId,
        lot_id: EntityId,
        item_description: String,
    },
    CheckpointChased {
        checkpoint_id: EntityId,
        lot_id: EntityId,
        chase_count: i32,
    },
    CheckpointEscalated {
        checkpoint_id: EntityId,
        lot_id: EntityId,
        escalated_to: Vec<String>,
        reason: String,
    },
    CheckpointReleased {
        checkpoint_id: EntityId,
        lot_id: EntityId,
        released_by: String,
    },
    CheckpointRejected {
        checkpoint_id: EntityId,
        lot_id: EntityId,
        reason: String,
    },
    ReleaseTokenIssued {
        token_id: EntityId,
        checkpoint_id: EntityId,
        recipient_email: String,
        recipient_name: String,
        expires_at: DateTime<Utc>,
    },
    IssueRaised {
        issue_id: EntityId,
        lot_id: EntityId,
        severity: IssueSeverity,
        raised_by: String,
    },
    IssueStatusChanged {
        issue_id: EntityId,
        lot_id: EntityId,
        status: IssueStatus,
    },
    IssueEscalated {
        issue_id: EntityId,
        lot_id: EntityId,
        escalated_to: String,
        reason: String,
    },
}

impl NotificationEvent {
    /// Event type name for logging and dispatch.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::CheckpointAwaitingRelease { .. } => "checkpoint_awaiting_release",
            Self::CheckpointChased { .. } => "checkpoint_chased",
            Self::CheckpointEscalated { .. } => "checkpoint_escalated",
            Self::CheckpointReleased { .. } => "checkpoint_released",
            Self::CheckpointRejected { .. } => "checkpoint_rejected",
            Self::ReleaseTokenIssued { .. } => "release_token_issued",
            Self::IssueRaised { .. } => "issue_raised",
            Self::IssueStatusChanged { .. } => "issue_status_changed",
            Self::IssueEscalated { .. } => "issue_escalated",
        }
    }
}

/// Delivery seam. Production wires an email/webhook sender here; tests and
/// the default deployment use the tracing notifier.
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn deliver(&self, event: NotificationEvent);
}

/// Shared handle used by route state.
pub type Notifier = Arc<dyn NotificationService>;

/// Default notifier: structured log lines, nothing else.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationService for TracingNotifier {
    async fn deliver(&self, event: NotificationEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => {
                tracing::info!(event = event.event_type(), payload = %payload, "notification")
            }
            Err(e) => tracing::warn!(event = event.event_type(), error = %e, "notification serialization failed"),
        }
    }
}

/// Fire-and-forget dispatch: spawn the delivery so the HTTP response never
/// waits on a notification channel.
pub fn notify(notifier: &Notifier, event: NotificationEvent) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        notifier.deliver(event).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotgate_core::new_entity_id;

    #[test]
    fn test_event_type_names_are_stable() {
        let event = NotificationEvent::IssueRaised {
            issue_id: new_entity_id(),
            lot_id: new_entity_id(),
            severity: IssueSeverity::Major,
            raised_by: "site.engineer@example.com".to_string(),
        };
        assert_eq!(event.event_type(), "issue_raised");
    }

    #[test]
    fn test_token_issued_event_serializes_without_secret() {
        let event = NotificationEvent::ReleaseTokenIssued {
            token_id: new_entity_id(),
            checkpoint_id: new_entity_id(),
            recipient_email: "inspector@authority.example".to_string(),
            recipient_name: "A. Inspector".to_string(),
            expires_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("release_token_issued"));
        assert!(!json.contains("secret"));
    }
}
