//! Shared application state for Axum routers.

use crate::auth::{validate_project_access, Access, AuthContext};
use crate::config::WorkflowConfig;
use crate::db::DbClient;
use crate::error::{ApiError, ApiResult};
use crate::events::Notifier;
use lotgate_core::{Checkpoint, EntityId, Issue, Lot};

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub db: DbClient,
    pub notifier: Notifier,
    pub access: Access,
    pub workflow: WorkflowConfig,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(db: DbClient, notifier: Notifier, access: Access, workflow: WorkflowConfig) -> Self {
        Self {
            db,
            notifier,
            access,
            workflow,
            start_time: std::time::Instant::now(),
        }
    }

    /// Load a lot and enforce project membership for the caller.
    pub async fn authorize_lot(&self, auth: &AuthContext, lot_id: EntityId) -> ApiResult<Lot> {
        let lot = self
            .db
            .lot_get(lot_id)
            .await?
            .ok_or_else(|| ApiError::lot_not_found(lot_id))?;
        validate_project_access(&self.access, auth, lot.project_id).await?;
        Ok(lot)
    }

    /// Load a checkpoint and enforce membership via its lot's project.
    pub async fn authorize_checkpoint(
        &self,
        auth: &AuthContext,
        checkpoint_id: EntityId,
    ) -> ApiResult<Checkpoint> {
        let checkpoint = self
            .db
            .checkpoint_get(checkpoint_id)
            .await?
            .ok_or_else(|| ApiError::checkpoint_not_found(checkpoint_id))?;
        self.authorize_lot(auth, checkpoint.lot_id).await?;
        Ok(checkpoint)
    }

    /// Load an issue and enforce membership via its lot's project.
    pub async fn authorize_issue(
        &self,
        auth: &AuthContext,
        issue_id: EntityId,
    ) -> ApiResult<Issue> {
        let issue = self
            .db
            .issue_get(issue_id)
            .await?
            .ok_or_else(|| ApiError::issue_not_found(issue_id))?;
        self.authorize_lot(auth, issue.lot_id).await?;
        Ok(issue)
    }
}
