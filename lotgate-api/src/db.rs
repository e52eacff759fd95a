//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling using deadpool-postgres, plus the DbClient
//! wrapper that owns every SQL statement in the API.
//!
//! Concurrency contract: every state transition is a conditional UPDATE
//! guarded on the current status ("update where status = X"); zero rows
//! affected means another request won the race and the caller gets a
//! Conflict. Transitions that change a lot's derived status run the
//! recount-and-write inside the same transaction, so dashboards never
//! observe "issue closed but lot still blocked".

use crate::error::{ApiError, ApiResult};
use chrono::{DateTime, Duration, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime, Transaction};
use lotgate_core::{
    derive_lot_status, ChecklistItem, Checkpoint, CheckpointStatus, CompletionRecord,
    CompletionStatus, EntityId, InspectionInstance, InspectionTemplate, Issue, IssueSeverity,
    IssueStatus, Lot, LotStatus, PointType, ReleaseAttribution, ReleaseToken, VerificationStatus,
};
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "lotgate".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("LOTGATE_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("LOTGATE_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("LOTGATE_DB_NAME").unwrap_or_else(|_| "lotgate".to_string()),
            user: std::env::var("LOTGATE_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("LOTGATE_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("LOTGATE_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn parse_status<T, E: std::fmt::Display>(
    parsed: Result<T, E>,
    column: &str,
) -> ApiResult<T> {
    parsed.map_err(|e| {
        tracing::error!("corrupt {} column: {}", column, e);
        ApiError::internal_error(format!("Corrupt {} value in storage", column))
    })
}

fn lot_from_row(row: &Row) -> ApiResult<Lot> {
    Ok(Lot {
        lot_id: row.get("lot_id"),
        project_id: row.get("project_id"),
        name: row.get("name"),
        status: parse_status(LotStatus::from_db_str(row.get("status")), "lot status")?,
        resting_status: parse_status(
            LotStatus::from_db_str(row.get("resting_status")),
            "lot resting status",
        )?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn template_from_row(row: &Row) -> InspectionTemplate {
    InspectionTemplate {
        template_id: row.get("template_id"),
        name: row.get("name"),
        activity_type: row.get("activity_type"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn item_from_row(row: &Row) -> ApiResult<ChecklistItem> {
    Ok(ChecklistItem {
        item_id: row.get("item_id"),
        template_id: row.get("template_id"),
        sequence: row.get("sequence"),
        description: row.get("description"),
        point_type: parse_status(PointType::from_db_str(row.get("point_type")), "point type")?,
        responsible_party: row.get("responsible_party"),
        evidence_required: row.get("evidence_required"),
        acceptance_criteria: row.get("acceptance_criteria"),
    })
}

fn instance_from_row(row: &Row) -> InspectionInstance {
    InspectionInstance {
        instance_id: row.get("instance_id"),
        lot_id: row.get("lot_id"),
        template_id: row.get("template_id"),
        snapshot: row.get("snapshot"),
        created_at: row.get("created_at"),
    }
}

fn completion_from_row(row: &Row) -> ApiResult<CompletionRecord> {
    Ok(CompletionRecord {
        record_id: row.get("record_id"),
        instance_id: row.get("instance_id"),
        item_id: row.get("item_id"),
        status: parse_status(
            CompletionStatus::from_db_str(row.get("status")),
            "completion status",
        )?,
        verification: parse_status(
            VerificationStatus::from_db_str(row.get("verification")),
            "verification status",
        )?,
        completed_by: row.get("completed_by"),
        evidence_refs: row.get("evidence_refs"),
        completed_at: row.get("completed_at"),
        updated_at: row.get("updated_at"),
    })
}

fn checkpoint_from_row(row: &Row) -> ApiResult<Checkpoint> {
    let escalation: Option<serde_json::Value> = row.get("escalation");
    let release: Option<serde_json::Value> = row.get("release");
    Ok(Checkpoint {
        checkpoint_id: row.get("checkpoint_id"),
        lot_id: row.get("lot_id"),
        item_id: row.get("item_id"),
        status: parse_status(
            CheckpointStatus::from_db_str(row.get("status")),
            "checkpoint status",
        )?,
        notification_sent_at: row.get("notification_sent_at"),
        chase_count: row.get("chase_count"),
        last_chased_at: row.get("last_chased_at"),
        escalation: escalation
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| {
                tracing::error!("corrupt escalation record: {}", e);
                ApiError::internal_error("Corrupt escalation record in storage")
            })?,
        released_at: row.get("released_at"),
        release: release.map(serde_json::from_value).transpose().map_err(|e| {
            tracing::error!("corrupt release attribution: {}", e);
            ApiError::internal_error("Corrupt release attribution in storage")
        })?,
        rejection_reason: row.get("rejection_reason"),
        created_at: row.get("created_at"),
    })
}

fn token_from_row(row: &Row) -> ReleaseToken {
    ReleaseToken {
        token_id: row.get("token_id"),
        checkpoint_id: row.get("checkpoint_id"),
        secret_digest: row.get("secret_digest"),
        recipient_email: row.get("recipient_email"),
        recipient_name: row.get("recipient_name"),
        expires_at: row.get("expires_at"),
        used_at: row.get("used_at"),
        superseded_at: row.get("superseded_at"),
        created_at: row.get("created_at"),
    }
}

fn issue_from_row(row: &Row) -> ApiResult<Issue> {
    Ok(Issue {
        issue_id: row.get("issue_id"),
        lot_id: row.get("lot_id"),
        raised_by: row.get("raised_by"),
        description: row.get("description"),
        category: row.get("category"),
        severity: parse_status(
            IssueSeverity::from_db_str(row.get("severity")),
            "issue severity",
        )?,
        status: parse_status(IssueStatus::from_db_str(row.get("status")), "issue status")?,
        due_date: row.get("due_date"),
        affected_lot_ids: row.get("affected_lot_ids"),
        root_cause: row.get("root_cause"),
        proposed_action: row.get("proposed_action"),
        qm_review_comments: row.get("qm_review_comments"),
        revision_requested: row.get("revision_requested"),
        revision_count: row.get("revision_count"),
        rectification_notes: row.get("rectification_notes"),
        evidence_refs: row.get("evidence_refs"),
        verification_notes: row.get("verification_notes"),
        lessons_learned: row.get("lessons_learned"),
        escalated_to: row.get("escalated_to"),
        escalation_reason: row.get("escalation_reason"),
        escalated_at: row.get("escalated_at"),
        created_at: row.get("created_at"),
        closed_at: row.get("closed_at"),
    })
}

const CHECKPOINT_COLS: &str = "checkpoint_id, lot_id, item_id, status, notification_sent_at, \
     chase_count, last_chased_at, escalation, released_at, release, rejection_reason, created_at";

const ISSUE_COLS: &str = "issue_id, lot_id, raised_by, description, category, severity, status, \
     due_date, affected_lot_ids, root_cause, proposed_action, qm_review_comments, \
     revision_requested, revision_count, rectification_notes, evidence_refs, \
     verification_notes, lessons_learned, escalated_to, escalation_reason, escalated_at, \
     created_at, closed_at";

// ============================================================================
// DATABASE CLIENT WRAPPER
// ============================================================================

/// Database client that wraps a connection pool and provides the high-level
/// operations the workflow engine needs.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl DbClient {
    /// Create a new database client with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Get a connection from the pool.
    async fn get_conn(&self) -> ApiResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(ApiError::from)
    }

    /// Readiness probe: round-trip a trivial query.
    pub async fn ping(&self) -> ApiResult<()> {
        let conn = self.get_conn().await?;
        conn.query_one("SELECT 1", &[]).await?;
        Ok(())
    }

    // ========================================================================
    // LOT OPERATIONS
    // ========================================================================

    /// Create a lot. Status starts at the resting value; the synchronizer
    /// owns it from here.
    pub async fn lot_create(
        &self,
        project_id: EntityId,
        name: &str,
        resting_status: LotStatus,
    ) -> ApiResult<Lot> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_one(
                "INSERT INTO lots (lot_id, project_id, name, status, resting_status) \
                 VALUES ($1, $2, $3, $4, $4) RETURNING *",
                &[
                    &lotgate_core::new_entity_id(),
                    &project_id,
                    &name,
                    &resting_status.as_db_str(),
                ],
            )
            .await?;
        lot_from_row(&row)
    }

    /// Get a lot by ID.
    pub async fn lot_get(&self, lot_id: EntityId) -> ApiResult<Option<Lot>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt("SELECT * FROM lots WHERE lot_id = $1", &[&lot_id])
            .await?;
        row.map(|r| lot_from_row(&r)).transpose()
    }

    /// Counts of open (non-terminal) issues and checkpoints for a lot.
    pub async fn lot_open_counts(&self, lot_id: EntityId) -> ApiResult<(i64, i64)> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_one(
                "SELECT \
                   (SELECT count(*) FROM issues WHERE lot_id = $1 \
                      AND status NOT IN ('closed', 'closed_concession')) AS open_issues, \
                   (SELECT count(*) FROM checkpoints WHERE lot_id = $1 \
                      AND status NOT IN ('released', 'rejected')) AS open_checkpoints",
                &[&lot_id],
            )
            .await?;
        Ok((row.get("open_issues"), row.get("open_checkpoints")))
    }

    /// Check project membership for the AccessChecker capability.
    pub async fn is_project_member(
        &self,
        principal: &str,
        project_id: EntityId,
    ) -> ApiResult<bool> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT 1 FROM project_members WHERE project_id = $1 AND principal = $2",
                &[&project_id, &principal],
            )
            .await?;
        Ok(row.is_some())
    }

    /// Grant project membership (admin/test plumbing).
    pub async fn project_member_add(
        &self,
        project_id: EntityId,
        principal: &str,
    ) -> ApiResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO project_members (project_id, principal) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
            &[&project_id, &principal],
        )
        .await?;
        Ok(())
    }

    // ========================================================================
    // TEMPLATE OPERATIONS
    // ========================================================================

    /// Create a template together with its checklist items.
    pub async fn template_create(
        &self,
        name: &str,
        activity_type: &str,
        items: &[ChecklistItem],
    ) -> ApiResult<(InspectionTemplate, Vec<ChecklistItem>)> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await?;

        let template_id = lotgate_core::new_entity_id();
        let row = tx
            .query_one(
                "INSERT INTO templates (template_id, name, activity_type) \
                 VALUES ($1, $2, $3) RETURNING *",
                &[&template_id, &name, &activity_type],
            )
            .await?;
        let template = template_from_row(&row);

        let mut created = Vec::with_capacity(items.len());
        for item in items {
            let row = tx
                .query_one(
                    "INSERT INTO checklist_items \
                       (item_id, template_id, sequence, description, point_type, \
                        responsible_party, evidence_required, acceptance_criteria) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
                    &[
                        &lotgate_core::new_entity_id(),
                        &template_id,
                        &item.sequence,
                        &item.description,
                        &item.point_type.as_db_str(),
                        &item.responsible_party,
                        &item.evidence_required,
                        &item.acceptance_criteria,
                    ],
                )
                .await?;
            created.push(item_from_row(&row)?);
        }

        tx.commit().await?;
        Ok((template, created))
    }

    /// Get a template and its items, ordered by sequence.
    pub async fn template_get(
        &self,
        template_id: EntityId,
    ) -> ApiResult<Option<(InspectionTemplate, Vec<ChecklistItem>)>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT * FROM templates WHERE template_id = $1",
                &[&template_id],
            )
            .await?;
        let Some(row) = row else { return Ok(None) };
        let template = template_from_row(&row);

        let rows = conn
            .query(
                "SELECT * FROM checklist_items WHERE template_id = $1 ORDER BY sequence",
                &[&template_id],
            )
            .await?;
        let items = rows
            .iter()
            .map(item_from_row)
            .collect::<ApiResult<Vec<_>>>()?;
        Ok(Some((template, items)))
    }

    // ========================================================================
    // INSPECTION INSTANCE OPERATIONS
    // ========================================================================

    /// Create the lot's inspection instance with its frozen snapshot blob.
    ///
    /// The UNIQUE constraint on lot_id is the race-proof form of the
    /// "at most one instance per lot" invariant; a violation maps to
    /// InstanceAlreadyExists rather than a generic database error.
    pub async fn instance_create(
        &self,
        lot_id: EntityId,
        template_id: EntityId,
        snapshot: &serde_json::Value,
    ) -> ApiResult<InspectionInstance> {
        let conn = self.get_conn().await?;
        let result = conn
            .query_one(
                "INSERT INTO instances (instance_id, lot_id, template_id, snapshot) \
                 VALUES ($1, $2, $3, $4) RETURNING *",
                &[
                    &lotgate_core::new_entity_id(),
                    &lot_id,
                    &template_id,
                    &snapshot,
                ],
            )
            .await;

        match result {
            Ok(row) => Ok(instance_from_row(&row)),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                Err(ApiError::instance_already_exists(lot_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get a lot's inspection instance.
    pub async fn instance_get_by_lot(
        &self,
        lot_id: EntityId,
    ) -> ApiResult<Option<InspectionInstance>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt("SELECT * FROM instances WHERE lot_id = $1", &[&lot_id])
            .await?;
        Ok(row.map(|r| instance_from_row(&r)))
    }

    /// Get an instance by its own ID.
    pub async fn instance_get(
        &self,
        instance_id: EntityId,
    ) -> ApiResult<Option<InspectionInstance>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT * FROM instances WHERE instance_id = $1",
                &[&instance_id],
            )
            .await?;
        Ok(row.map(|r| instance_from_row(&r)))
    }

    /// All completion records for an instance.
    pub async fn completions_for_instance(
        &self,
        instance_id: EntityId,
    ) -> ApiResult<Vec<CompletionRecord>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT * FROM completion_records WHERE instance_id = $1",
                &[&instance_id],
            )
            .await?;
        rows.iter().map(completion_from_row).collect()
    }

    /// Upsert the completion record for one checklist item.
    pub async fn completion_upsert(
        &self,
        instance_id: EntityId,
        item_id: EntityId,
        status: CompletionStatus,
        verification: VerificationStatus,
        completed_by: Option<&str>,
        evidence_refs: &[String],
    ) -> ApiResult<CompletionRecord> {
        let conn = self.get_conn().await?;
        let completed_at: Option<DateTime<Utc>> = if status == CompletionStatus::Completed {
            Some(Utc::now())
        } else {
            None
        };
        let row = conn
            .query_one(
                "INSERT INTO completion_records \
                   (record_id, instance_id, item_id, status, verification, completed_by, \
                    evidence_refs, completed_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (instance_id, item_id) DO UPDATE SET \
                   status = EXCLUDED.status, \
                   verification = EXCLUDED.verification, \
                   completed_by = EXCLUDED.completed_by, \
                   evidence_refs = EXCLUDED.evidence_refs, \
                   completed_at = EXCLUDED.completed_at, \
                   updated_at = now() \
                 RETURNING *",
                &[
                    &lotgate_core::new_entity_id(),
                    &instance_id,
                    &item_id,
                    &status.as_db_str(),
                    &verification.as_db_str(),
                    &completed_by,
                    &evidence_refs,
                    &completed_at,
                ],
            )
            .await?;
        completion_from_row(&row)
    }

    // ========================================================================
    // CHECKPOINT OPERATIONS
    // ========================================================================

    /// Spawn a checkpoint for a completed hold item unless a live one
    /// already exists for the (lot, item) pair. Returns None when the
    /// partial unique index says one is live. Runs the status sync: a new
    /// live checkpoint immediately blocks the lot.
    pub async fn checkpoint_create_if_absent(
        &self,
        lot_id: EntityId,
        item_id: EntityId,
    ) -> ApiResult<Option<Checkpoint>> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await?;

        let result = tx
            .query_one(
                &format!(
                    "INSERT INTO checkpoints (checkpoint_id, lot_id, item_id, status) \
                     VALUES ($1, $2, $3, 'pending') RETURNING {}",
                    CHECKPOINT_COLS
                ),
                &[&lotgate_core::new_entity_id(), &lot_id, &item_id],
            )
            .await;

        let checkpoint = match result {
            Ok(row) => checkpoint_from_row(&row)?,
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                // A live checkpoint already exists for this pair.
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        sync_lot_status(&tx, lot_id).await?;
        tx.commit().await?;
        Ok(Some(checkpoint))
    }

    /// Get a checkpoint by ID.
    pub async fn checkpoint_get(&self, checkpoint_id: EntityId) -> ApiResult<Option<Checkpoint>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                &format!(
                    "SELECT {} FROM checkpoints WHERE checkpoint_id = $1",
                    CHECKPOINT_COLS
                ),
                &[&checkpoint_id],
            )
            .await?;
        row.map(|r| checkpoint_from_row(&r)).transpose()
    }

    /// List all checkpoints for a lot, newest first.
    pub async fn checkpoints_for_lot(&self, lot_id: EntityId) -> ApiResult<Vec<Checkpoint>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM checkpoints WHERE lot_id = $1 ORDER BY created_at DESC",
                    CHECKPOINT_COLS
                ),
                &[&lot_id],
            )
            .await?;
        rows.iter().map(checkpoint_from_row).collect()
    }

    /// Pending -> notified. Idempotent: an already-notified checkpoint is
    /// returned unchanged; terminal states are a Conflict.
    pub async fn checkpoint_notify(&self, checkpoint_id: EntityId) -> ApiResult<Checkpoint> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                &format!(
                    "UPDATE checkpoints SET status = 'notified', notification_sent_at = now() \
                     WHERE checkpoint_id = $1 AND status = 'pending' RETURNING {}",
                    CHECKPOINT_COLS
                ),
                &[&checkpoint_id],
            )
            .await?;
        if let Some(row) = row {
            return checkpoint_from_row(&row);
        }

        // Zero rows: either not found, already notified (no-op), or terminal.
        let current = self
            .checkpoint_get(checkpoint_id)
            .await?
            .ok_or_else(|| ApiError::checkpoint_not_found(checkpoint_id))?;
        match current.status {
            CheckpointStatus::Notified => Ok(current),
            status => Err(ApiError::state_conflict(format!(
                "cannot notify a {} checkpoint",
                status
            ))),
        }
    }

    /// Record an informational chase. Valid only while notified.
    pub async fn checkpoint_chase(&self, checkpoint_id: EntityId) -> ApiResult<Checkpoint> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                &format!(
                    "UPDATE checkpoints SET chase_count = chase_count + 1, last_chased_at = now() \
                     WHERE checkpoint_id = $1 AND status = 'notified' RETURNING {}",
                    CHECKPOINT_COLS
                ),
                &[&checkpoint_id],
            )
            .await?;
        match row {
            Some(row) => checkpoint_from_row(&row),
            None => Err(self.checkpoint_guard_error(checkpoint_id, "chase").await?),
        }
    }

    /// Set the orthogonal escalation record. Guarded against terminal
    /// states and against stacking on an unresolved escalation.
    pub async fn checkpoint_escalate(
        &self,
        checkpoint_id: EntityId,
        escalation: &serde_json::Value,
    ) -> ApiResult<Checkpoint> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                &format!(
                    "UPDATE checkpoints SET escalation = $2 \
                     WHERE checkpoint_id = $1 \
                       AND status NOT IN ('released', 'rejected') \
                       AND (escalation IS NULL OR (escalation->>'resolved')::boolean) \
                     RETURNING {}",
                    CHECKPOINT_COLS
                ),
                &[&checkpoint_id, &escalation],
            )
            .await?;
        match row {
            Some(row) => checkpoint_from_row(&row),
            None => {
                let current = self
                    .checkpoint_get(checkpoint_id)
                    .await?
                    .ok_or_else(|| ApiError::checkpoint_not_found(checkpoint_id))?;
                if current.is_escalated() {
                    Err(ApiError::state_conflict(
                        "checkpoint is already escalated and unresolved",
                    ))
                } else {
                    Err(ApiError::state_conflict(format!(
                        "cannot escalate a {} checkpoint",
                        current.status
                    )))
                }
            }
        }
    }

    /// Mark the current escalation resolved.
    pub async fn checkpoint_resolve_escalation(
        &self,
        checkpoint_id: EntityId,
    ) -> ApiResult<Checkpoint> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                &format!(
                    "UPDATE checkpoints SET escalation = escalation \
                       || jsonb_build_object('resolved', true, 'resolved_at', to_jsonb(now())) \
                     WHERE checkpoint_id = $1 \
                       AND escalation IS NOT NULL \
                       AND NOT (escalation->>'resolved')::boolean \
                     RETURNING {}",
                    CHECKPOINT_COLS
                ),
                &[&checkpoint_id],
            )
            .await?;
        match row {
            Some(row) => checkpoint_from_row(&row),
            None => {
                self.checkpoint_get(checkpoint_id)
                    .await?
                    .ok_or_else(|| ApiError::checkpoint_not_found(checkpoint_id))?;
                Err(ApiError::state_conflict("no unresolved escalation"))
            }
        }
    }

    /// Notified -> released, with attribution, syncing the lot's derived
    /// status in the same transaction.
    pub async fn checkpoint_release(
        &self,
        checkpoint_id: EntityId,
        attribution: &ReleaseAttribution,
    ) -> ApiResult<Checkpoint> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await?;
        let checkpoint = release_checkpoint_in_tx(&tx, checkpoint_id, attribution).await?;
        let checkpoint = match checkpoint {
            Some(cp) => cp,
            None => {
                tx.rollback().await?;
                return Err(self.checkpoint_guard_error(checkpoint_id, "release").await?);
            }
        };
        sync_lot_status(&tx, checkpoint.lot_id).await?;
        tx.commit().await?;
        Ok(checkpoint)
    }

    /// Notified -> rejected, symmetric to release.
    pub async fn checkpoint_reject(
        &self,
        checkpoint_id: EntityId,
        reason: &str,
    ) -> ApiResult<Checkpoint> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await?;
        let row = tx
            .query_opt(
                &format!(
                    "UPDATE checkpoints SET status = 'rejected', released_at = now(), \
                       rejection_reason = $2 \
                     WHERE checkpoint_id = $1 AND status = 'notified' RETURNING {}",
                    CHECKPOINT_COLS
                ),
                &[&checkpoint_id, &reason],
            )
            .await?;
        let checkpoint = match row {
            Some(row) => checkpoint_from_row(&row)?,
            None => {
                tx.rollback().await?;
                return Err(self.checkpoint_guard_error(checkpoint_id, "reject").await?);
            }
        };
        sync_lot_status(&tx, checkpoint.lot_id).await?;
        tx.commit().await?;
        Ok(checkpoint)
    }

    /// Notified checkpoints whose last contact (chase, else notification) is
    /// older than the threshold. Read-side input for the external
    /// escalation-scan scheduler.
    pub async fn checkpoints_stale(&self, older_than: Duration) -> ApiResult<Vec<Checkpoint>> {
        let conn = self.get_conn().await?;
        let cutoff = Utc::now() - older_than;
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM checkpoints \
                     WHERE status = 'notified' \
                       AND COALESCE(last_chased_at, notification_sent_at) < $1 \
                     ORDER BY notification_sent_at",
                    CHECKPOINT_COLS
                ),
                &[&cutoff],
            )
            .await?;
        rows.iter().map(checkpoint_from_row).collect()
    }

    /// Distinguish not-found from guard-violation after a zero-row
    /// conditional update.
    async fn checkpoint_guard_error(
        &self,
        checkpoint_id: EntityId,
        verb: &str,
    ) -> ApiResult<ApiError> {
        let current = self.checkpoint_get(checkpoint_id).await?;
        Ok(match current {
            None => ApiError::checkpoint_not_found(checkpoint_id),
            Some(cp) => ApiError::state_conflict(format!(
                "cannot {} a {} checkpoint",
                verb, cp.status
            )),
        })
    }

    // ========================================================================
    // RELEASE TOKEN OPERATIONS
    // ========================================================================

    /// Issue a new token for a checkpoint, superseding any live predecessor
    /// in the same transaction so at most one token is live at a time.
    pub async fn token_issue(
        &self,
        checkpoint_id: EntityId,
        secret_digest: &str,
        recipient_email: &str,
        recipient_name: &str,
        expires_at: DateTime<Utc>,
    ) -> ApiResult<ReleaseToken> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await?;

        tx.execute(
            "UPDATE release_tokens SET superseded_at = now() \
             WHERE checkpoint_id = $1 AND used_at IS NULL AND superseded_at IS NULL",
            &[&checkpoint_id],
        )
        .await?;

        let row = tx
            .query_one(
                "INSERT INTO release_tokens \
                   (token_id, checkpoint_id, secret_digest, recipient_email, recipient_name, \
                    expires_at) \
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
                &[
                    &lotgate_core::new_entity_id(),
                    &checkpoint_id,
                    &secret_digest,
                    &recipient_email,
                    &recipient_name,
                    &expires_at,
                ],
            )
            .await?;

        tx.commit().await?;
        Ok(token_from_row(&row))
    }

    /// Look up a token by its secret digest. Liveness checks belong to the
    /// caller; this is a plain read.
    pub async fn token_get_by_digest(&self, secret_digest: &str) -> ApiResult<Option<ReleaseToken>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT * FROM release_tokens WHERE secret_digest = $1",
                &[&secret_digest],
            )
            .await?;
        Ok(row.map(|r| token_from_row(&r)))
    }

    /// Atomically consume a token and release its checkpoint.
    ///
    /// The expiry/unused check and the used_at write are ONE conditional
    /// UPDATE: two racing requests on the same secret produce exactly one
    /// success. If the checkpoint itself cannot be released (e.g. already
    /// rejected internally), the whole transaction rolls back and the token
    /// stays unconsumed.
    pub async fn token_consume_and_release(
        &self,
        secret_digest: &str,
        attribution: &ReleaseAttribution,
    ) -> ApiResult<(ReleaseToken, Checkpoint)> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await?;

        let row = tx
            .query_opt(
                "UPDATE release_tokens SET used_at = now() \
                 WHERE secret_digest = $1 \
                   AND used_at IS NULL AND superseded_at IS NULL AND expires_at > now() \
                 RETURNING *",
                &[&secret_digest],
            )
            .await?;

        let token = match row {
            Some(row) => token_from_row(&row),
            None => {
                tx.rollback().await?;
                return Err(self.token_guard_error(secret_digest).await?);
            }
        };

        let checkpoint =
            release_checkpoint_in_tx(&tx, token.checkpoint_id, attribution).await?;
        let checkpoint = match checkpoint {
            Some(cp) => cp,
            None => {
                // Token is not consumed when the release guard fails.
                tx.rollback().await?;
                return Err(self
                    .checkpoint_guard_error(token.checkpoint_id, "release")
                    .await?);
            }
        };

        sync_lot_status(&tx, checkpoint.lot_id).await?;
        tx.commit().await?;
        Ok((token, checkpoint))
    }

    /// Classify a failed token consumption without leaking whether a
    /// near-matching secret exists.
    async fn token_guard_error(&self, secret_digest: &str) -> ApiResult<ApiError> {
        let token = self.token_get_by_digest(secret_digest).await?;
        Ok(match token {
            None => ApiError::token_not_found(),
            Some(t) if t.used_at.is_some() => ApiError::token_consumed(),
            Some(t) if t.superseded_at.is_some() => ApiError::token_not_found(),
            Some(_) => ApiError::token_expired(),
        })
    }

    // ========================================================================
    // ISSUE OPERATIONS
    // ========================================================================

    /// Insert a newly raised issue and sync the lot's derived status in the
    /// same transaction.
    pub async fn issue_raise(&self, issue: &Issue) -> ApiResult<Issue> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await?;

        let row = tx
            .query_one(
                &format!(
                    "INSERT INTO issues \
                       (issue_id, lot_id, raised_by, description, category, severity, status, \
                        due_date, affected_lot_ids) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
                    ISSUE_COLS
                ),
                &[
                    &issue.issue_id,
                    &issue.lot_id,
                    &issue.raised_by,
                    &issue.description,
                    &issue.category,
                    &issue.severity.as_db_str(),
                    &issue.status.as_db_str(),
                    &issue.due_date,
                    &issue.affected_lot_ids,
                ],
            )
            .await?;
        let created = issue_from_row(&row)?;

        sync_lot_status(&tx, issue.lot_id).await?;
        tx.commit().await?;
        Ok(created)
    }

    /// Get an issue by ID.
    pub async fn issue_get(&self, issue_id: EntityId) -> ApiResult<Option<Issue>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                &format!("SELECT {} FROM issues WHERE issue_id = $1", ISSUE_COLS),
                &[&issue_id],
            )
            .await?;
        row.map(|r| issue_from_row(&r)).transpose()
    }

    /// List issues for a lot, optionally filtered by status.
    pub async fn issues_for_lot(
        &self,
        lot_id: EntityId,
        status: Option<IssueStatus>,
    ) -> ApiResult<Vec<Issue>> {
        let conn = self.get_conn().await?;
        let rows = match status {
            Some(status) => {
                conn.query(
                    &format!(
                        "SELECT {} FROM issues WHERE lot_id = $1 AND status = $2 \
                         ORDER BY created_at DESC",
                        ISSUE_COLS
                    ),
                    &[&lot_id, &status.as_db_str()],
                )
                .await?
            }
            None => {
                conn.query(
                    &format!(
                        "SELECT {} FROM issues WHERE lot_id = $1 ORDER BY created_at DESC",
                        ISSUE_COLS
                    ),
                    &[&lot_id],
                )
                .await?
            }
        };
        rows.iter().map(issue_from_row).collect()
    }

    /// Persist a non-closing issue transition (respond, review, rectify).
    ///
    /// The write is conditional on the status AND revision_count the service
    /// read before applying the core guard, which makes transitions
    /// serializable per issue: a concurrent writer causes zero rows and a
    /// Conflict instead of a lost update. Closing transitions go through
    /// `issue_close` because they also need the status sync.
    pub async fn issue_persist_transition(
        &self,
        issue: &Issue,
        expected_status: IssueStatus,
        expected_revision_count: i32,
    ) -> ApiResult<Issue> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await?;
        let updated =
            persist_issue_fields_in_tx(&tx, issue, expected_status, expected_revision_count)
                .await?;
        let updated = match updated {
            Some(i) => i,
            None => {
                tx.rollback().await?;
                return Err(self.issue_guard_error(issue.issue_id).await?);
            }
        };
        // Escalated issues still count as open, but run the sync anyway so
        // the stored status stays authoritative whatever the transition was.
        sync_lot_status(&tx, issue.lot_id).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Persist a closing transition and sync the lot in one transaction.
    pub async fn issue_close(
        &self,
        issue: &Issue,
        expected_revision_count: i32,
    ) -> ApiResult<Issue> {
        let mut conn = self.get_conn().await?;
        let tx = conn.transaction().await?;
        let updated = persist_issue_fields_in_tx(
            &tx,
            issue,
            IssueStatus::Verification,
            expected_revision_count,
        )
        .await?;
        let updated = match updated {
            Some(i) => i,
            None => {
                tx.rollback().await?;
                return Err(self.issue_guard_error(issue.issue_id).await?);
            }
        };
        sync_lot_status(&tx, issue.lot_id).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn issue_guard_error(&self, issue_id: EntityId) -> ApiResult<ApiError> {
        let current = self.issue_get(issue_id).await?;
        Ok(match current {
            None => ApiError::issue_not_found(issue_id),
            Some(i) => ApiError::state_conflict(format!(
                "issue {} was modified concurrently (now {})",
                issue_id, i.status
            )),
        })
    }
}

// ============================================================================
// TRANSACTION HELPERS
// ============================================================================

/// Guarded release of a checkpoint inside an open transaction. Returns None
/// on a guard failure (caller decides between NotFound and Conflict).
async fn release_checkpoint_in_tx(
    tx: &Transaction<'_>,
    checkpoint_id: EntityId,
    attribution: &ReleaseAttribution,
) -> ApiResult<Option<Checkpoint>> {
    let attribution_json = serde_json::to_value(attribution)?;
    let row = tx
        .query_opt(
            &format!(
                "UPDATE checkpoints SET status = 'released', released_at = now(), release = $2 \
                 WHERE checkpoint_id = $1 AND status = 'notified' RETURNING {}",
                CHECKPOINT_COLS
            ),
            &[&checkpoint_id, &attribution_json],
        )
        .await?;
    row.map(|r| checkpoint_from_row(&r)).transpose()
}

/// Write every service-mutable issue field, conditional on the previously
/// read status and revision count.
async fn persist_issue_fields_in_tx(
    tx: &Transaction<'_>,
    issue: &Issue,
    expected_status: IssueStatus,
    expected_revision_count: i32,
) -> ApiResult<Option<Issue>> {
    let row = tx
        .query_opt(
            &format!(
                "UPDATE issues SET \
                   status = $2, root_cause = $3, proposed_action = $4, \
                   qm_review_comments = $5, revision_requested = $6, revision_count = $7, \
                   rectification_notes = $8, evidence_refs = $9, verification_notes = $10, \
                   lessons_learned = $11, escalated_to = $12, escalation_reason = $13, \
                   escalated_at = $14, closed_at = $15 \
                 WHERE issue_id = $1 AND status = $16 AND revision_count = $17 \
                 RETURNING {}",
                ISSUE_COLS
            ),
            &[
                &issue.issue_id,
                &issue.status.as_db_str(),
                &issue.root_cause,
                &issue.proposed_action,
                &issue.qm_review_comments,
                &issue.revision_requested,
                &issue.revision_count,
                &issue.rectification_notes,
                &issue.evidence_refs,
                &issue.verification_notes,
                &issue.lessons_learned,
                &issue.escalated_to,
                &issue.escalation_reason,
                &issue.escalated_at,
                &issue.closed_at,
                &expected_status.as_db_str(),
                &expected_revision_count,
            ],
        )
        .await?;
    row.map(|r| issue_from_row(&r)).transpose()
}

/// The Work-Unit Status Synchronizer.
///
/// Recounts open issues/checkpoints for the lot, derives the visible status
/// with the pure core function, and writes it - all inside the caller's
/// transaction. If this fails the triggering transition rolls back with it,
/// which is exactly the invariant: the stored status is never allowed to
/// drift from the open-issue/checkpoint sets.
pub(crate) async fn sync_lot_status(tx: &Transaction<'_>, lot_id: EntityId) -> ApiResult<Lot> {
    let row = tx
        .query_one(
            "SELECT l.*, \
               (SELECT count(*) FROM issues WHERE lot_id = l.lot_id \
                  AND status NOT IN ('closed', 'closed_concession')) AS open_issues, \
               (SELECT count(*) FROM checkpoints WHERE lot_id = l.lot_id \
                  AND status NOT IN ('released', 'rejected')) AS open_checkpoints \
             FROM lots l WHERE l.lot_id = $1 FOR UPDATE",
            &[&lot_id],
        )
        .await?;

    let lot = lot_from_row(&row)?;
    let open_issues: i64 = row.get("open_issues");
    let open_checkpoints: i64 = row.get("open_checkpoints");

    let derived = derive_lot_status(open_issues, open_checkpoints, lot.resting_status);
    if derived == lot.status {
        return Ok(lot);
    }

    let row = tx
        .query_one(
            "UPDATE lots SET status = $2, updated_at = now() WHERE lot_id = $1 RETURNING *",
            &[&lot_id, &derived.as_db_str()],
        )
        .await?;
    lot_from_row(&row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_defaults() {
        let config = DbConfig::default();
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "lotgate");
        assert_eq!(config.max_size, 16);
    }

    #[test]
    fn test_db_config_from_env_falls_back() {
        // Unset vars fall back to defaults rather than erroring.
        let config = DbConfig::from_env();
        assert!(!config.dbname.is_empty());
        assert!(config.max_size > 0);
    }
}
