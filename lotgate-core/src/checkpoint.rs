//! Checkpoint (hold point) lifecycle.
//!
//! # State Transition Diagram
//!
//! ```text
//! spawn() → Pending ── notify() → Notified ──┬── release() → Released (terminal)
//!                                            └── reject() ──→ Rejected (terminal)
//! ```
//!
//! `chase()` accumulates on Notified without changing state. Escalation is an
//! orthogonal side-record: a notified checkpoint can be escalated while still
//! notified, and the primary enum never grows combined states.
//!
//! The guards here are pure; the API layer re-asserts each one with a
//! conditional UPDATE so two racing requests cannot both win.

use crate::{
    Checkpoint, CheckpointStatus, EntityType, ReleaseAttribution, ReleaseMethod, Timestamp,
    WorkflowError, WorkflowResult,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Escalation side-state layered on the primary checkpoint machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EscalationRecord {
    pub escalated_by: String,
    pub escalated_to: Vec<String>,
    pub reason: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub escalated_at: Timestamp,
    /// Escalation is not stackable: a new escalation is rejected until this
    /// one is resolved (or the checkpoint reaches a terminal state).
    pub resolved: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub resolved_at: Option<Timestamp>,
}

impl Checkpoint {
    /// Create a fresh checkpoint for a completed hold-point item.
    pub fn spawn(
        checkpoint_id: crate::EntityId,
        lot_id: crate::EntityId,
        item_id: crate::EntityId,
        now: Timestamp,
    ) -> Self {
        Self {
            checkpoint_id,
            lot_id,
            item_id,
            status: CheckpointStatus::Pending,
            notification_sent_at: None,
            chase_count: 0,
            last_chased_at: None,
            escalation: None,
            released_at: None,
            release: None,
            rejection_reason: None,
            created_at: now,
        }
    }

    /// True when an unresolved escalation is pending.
    pub fn is_escalated(&self) -> bool {
        self.escalation.as_ref().map_or(false, |e| !e.resolved)
    }

    /// Pending → Notified. Idempotent: notifying an already-notified
    /// checkpoint is a no-op, not a Conflict (re-sending mail is harmless).
    pub fn notify(&mut self, now: Timestamp) -> WorkflowResult<bool> {
        match self.status {
            CheckpointStatus::Pending => {
                self.status = CheckpointStatus::Notified;
                self.notification_sent_at = Some(now);
                Ok(true)
            }
            CheckpointStatus::Notified => Ok(false),
            terminal => Err(WorkflowError::invalid_transition(
                EntityType::Checkpoint,
                self.checkpoint_id,
                format!("cannot notify a {} checkpoint", terminal),
            )),
        }
    }

    /// Record an informational reminder. Valid only while notified.
    pub fn chase(&mut self, now: Timestamp) -> WorkflowResult<()> {
        if self.status != CheckpointStatus::Notified {
            return Err(WorkflowError::invalid_transition(
                EntityType::Checkpoint,
                self.checkpoint_id,
                format!("cannot chase a {} checkpoint", self.status),
            ));
        }
        self.chase_count += 1;
        self.last_chased_at = Some(now);
        Ok(())
    }

    /// Flip the orthogonal escalation flag. Fails if the checkpoint is
    /// terminal or an unresolved escalation already exists.
    pub fn escalate(
        &mut self,
        escalated_by: String,
        escalated_to: Vec<String>,
        reason: String,
        now: Timestamp,
    ) -> WorkflowResult<()> {
        if self.status.is_terminal() {
            return Err(WorkflowError::invalid_transition(
                EntityType::Checkpoint,
                self.checkpoint_id,
                format!("cannot escalate a {} checkpoint", self.status),
            ));
        }
        if self.is_escalated() {
            return Err(WorkflowError::invalid_transition(
                EntityType::Checkpoint,
                self.checkpoint_id,
                "already escalated and unresolved",
            ));
        }
        self.escalation = Some(EscalationRecord {
            escalated_by,
            escalated_to,
            reason,
            escalated_at: now,
            resolved: false,
            resolved_at: None,
        });
        Ok(())
    }

    /// Mark the current escalation resolved, unblocking later re-escalation.
    pub fn resolve_escalation(&mut self, now: Timestamp) -> WorkflowResult<()> {
        match self.escalation.as_mut() {
            Some(esc) if !esc.resolved => {
                esc.resolved = true;
                esc.resolved_at = Some(now);
                Ok(())
            }
            _ => Err(WorkflowError::invalid_transition(
                EntityType::Checkpoint,
                self.checkpoint_id,
                "no unresolved escalation",
            )),
        }
    }

    /// Notified → Released.
    pub fn release(
        &mut self,
        released_by_name: String,
        released_by_org: Option<String>,
        notes: Option<String>,
        method: ReleaseMethod,
        now: Timestamp,
    ) -> WorkflowResult<()> {
        if self.status != CheckpointStatus::Notified {
            return Err(WorkflowError::invalid_transition(
                EntityType::Checkpoint,
                self.checkpoint_id,
                format!("cannot release a {} checkpoint", self.status),
            ));
        }
        self.status = CheckpointStatus::Released;
        self.released_at = Some(now);
        self.release = Some(ReleaseAttribution {
            released_by_name,
            released_by_org,
            release_notes: notes,
            release_method: method,
        });
        Ok(())
    }

    /// Notified → Rejected. Symmetric to release; the completion record for
    /// the originating item stays failed, so the lot remains blocked until
    /// re-work spawns a fresh checkpoint.
    pub fn reject(&mut self, reason: String, now: Timestamp) -> WorkflowResult<()> {
        if self.status != CheckpointStatus::Notified {
            return Err(WorkflowError::invalid_transition(
                EntityType::Checkpoint,
                self.checkpoint_id,
                format!("cannot reject a {} checkpoint", self.status),
            ));
        }
        self.status = CheckpointStatus::Rejected;
        self.released_at = Some(now);
        self.rejection_reason = Some(reason);
        Ok(())
    }

    /// Staleness input for the external escalation scheduler: time since the
    /// most recent contact (chase if any, otherwise the original notification).
    pub fn is_stale(&self, threshold: Duration, now: Timestamp) -> bool {
        if self.status != CheckpointStatus::Notified {
            return false;
        }
        let last_contact = self.last_chased_at.or(self.notification_sent_at);
        match last_contact {
            Some(t) => now - t >= threshold,
            None => false,
        }
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

    fn spawn_checkpoint() -> Checkpoint {
        Checkpoint::spawn(new_entity_id(), new_entity_id(), new_entity_id(), Utc::now())
    }

    fn notified_checkpoint() -> Checkpoint {
        let mut cp = spawn_checkpoint();
        cp.notify(Utc::now()).unwrap();
        cp
    }

    #[test]
    fn test_notify_is_idempotent() {
        let mut cp = spawn_checkpoint();
        assert_eq!(cp.notify(Utc::now()), Ok(true));
        let first_sent = cp.notification_sent_at;
        assert_eq!(cp.notify(Utc::now()), Ok(false));
        assert_eq!(cp.notification_sent_at, first_sent);
        assert_eq!(cp.status, CheckpointStatus::Notified);
    }

    #[test]
    fn test_notify_after_terminal_fails() {
        let mut cp = notified_checkpoint();
        cp.release("QM".to_string(), None, None, ReleaseMethod::Internal, Utc::now())
            .unwrap();
        assert!(cp.notify(Utc::now()).is_err());
    }

    #[test]
    fn test_chase_only_while_notified() {
        let mut cp = spawn_checkpoint();
        assert!(cp.chase(Utc::now()).is_err());

        cp.notify(Utc::now()).unwrap();
        cp.chase(Utc::now()).unwrap();
        cp.chase(Utc::now()).unwrap();
        assert_eq!(cp.chase_count, 2);
        assert!(cp.last_chased_at.is_some());

        cp.release("QM".to_string(), None, None, ReleaseMethod::Internal, Utc::now())
            .unwrap();
        assert!(cp.chase(Utc::now()).is_err());
    }

    #[test]
    fn test_release_requires_notified() {
        let mut cp = spawn_checkpoint();
        let err = cp
            .release("QM".to_string(), None, None, ReleaseMethod::Internal, Utc::now())
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    }

    #[test]
    fn test_release_then_release_conflicts() {
        let mut cp = notified_checkpoint();
        cp.release(
            "Jane Site".to_string(),
            Some("Client Org".to_string()),
            Some("looks good".to_string()),
            ReleaseMethod::ExternalToken,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(cp.status, CheckpointStatus::Released);
        assert!(cp.released_at.is_some());
        let attribution = cp.release.as_ref().unwrap();
        assert_eq!(attribution.release_method, ReleaseMethod::ExternalToken);

        assert!(cp
            .release("Other".to_string(), None, None, ReleaseMethod::Internal, Utc::now())
            .is_err());
    }

    #[test]
    fn test_reject_is_terminal_and_attributed() {
        let mut cp = notified_checkpoint();
        cp.reject("defective formwork".to_string(), Utc::now()).unwrap();
        assert_eq!(cp.status, CheckpointStatus::Rejected);
        assert_eq!(cp.rejection_reason.as_deref(), Some("defective formwork"));
        assert!(cp.release("X".to_string(), None, None, ReleaseMethod::Internal, Utc::now()).is_err());
        assert!(cp.reject("again".to_string(), Utc::now()).is_err());
    }

    // Notified 3 days ago, chased twice, then escalated by a PM.
    #[test]
    fn test_escalation_single_shot_while_unresolved() {
        let notified_at = Utc::now() - Duration::days(3);
        let mut cp = spawn_checkpoint();
        cp.notify(notified_at).unwrap();
        cp.chase(notified_at + Duration::days(1)).unwrap();
        cp.chase(notified_at + Duration::days(2)).unwrap();

        cp.escalate(
            "pm@example.com".to_string(),
            vec!["director@example.com".to_string()],
            "no response".to_string(),
            Utc::now(),
        )
        .unwrap();

        assert!(cp.is_escalated());
        let first_at = cp.escalation.as_ref().unwrap().escalated_at;

        // Second escalation while unresolved must conflict and must not
        // touch the original timestamp.
        let err = cp
            .escalate(
                "pm@example.com".to_string(),
                vec!["ceo@example.com".to_string()],
                "still nothing".to_string(),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
        assert_eq!(cp.escalation.as_ref().unwrap().escalated_at, first_at);
        assert_eq!(cp.status, CheckpointStatus::Notified);
    }

    #[test]
    fn test_escalation_resolvable_then_repeatable() {
        let mut cp = notified_checkpoint();
        cp.escalate("pm".to_string(), vec!["dir".to_string()], "r1".to_string(), Utc::now())
            .unwrap();
        cp.resolve_escalation(Utc::now()).unwrap();
        assert!(!cp.is_escalated());
        assert!(cp.resolve_escalation(Utc::now()).is_err());

        // Second escalation after resolution is allowed.
        cp.escalate("pm".to_string(), vec!["dir".to_string()], "r2".to_string(), Utc::now())
            .unwrap();
        assert!(cp.is_escalated());
    }

    #[test]
    fn test_escalate_terminal_checkpoint_fails() {
        let mut cp = notified_checkpoint();
        cp.reject("bad".to_string(), Utc::now()).unwrap();
        assert!(cp
            .escalate("pm".to_string(), vec![], "late".to_string(), Utc::now())
            .is_err());
    }

    #[test]
    fn test_staleness_uses_last_contact() {
        let now = Utc::now();
        let mut cp = spawn_checkpoint();
        assert!(!cp.is_stale(Duration::hours(24), now));

        cp.notify(now - Duration::hours(30)).unwrap();
        assert!(cp.is_stale(Duration::hours(24), now));

        // A chase resets the staleness clock.
        cp.chase(now - Duration::hours(2)).unwrap();
        assert!(!cp.is_stale(Duration::hours(24), now));

        cp.release("QM".to_string(), None, None, ReleaseMethod::Internal, now)
            .unwrap();
        assert!(!cp.is_stale(Duration::hours(0), now));
    }
}
