//! Pending-action store: the single source of truth for "what is this
//! actor in the middle of doing."
//!
//! Invariants owned here: at most one `pending` record per actor (creating
//! a new one cancels the previous), lazy TTL expiry on read, TTL reset on
//! every slot-filling update, idempotent terminal transitions, and an
//! age-predicate retention purge for terminal records.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use opsdesk_core::pending::{PendingAction, PendingStatus, PendingUpdate};

use crate::error::AppError;

/// Store contract for pending actions. The executor and the routes only
/// touch pending records through these operations; `Pg` is the production
/// implementation, tests use an in-memory fake with the same semantics.
#[allow(async_fn_in_trait)]
pub trait PendingActionStore {
    /// Flip any overdue `pending` record for this actor to `expired`, then
    /// return the most recently created record still `pending`, if any.
    /// A read with a side effect — callers must tolerate the flip.
    async fn get_active(&self, actor_id: Uuid) -> Result<Option<PendingAction>, AppError>;

    /// Cancel any existing `pending` record for the actor, then insert a
    /// fresh one expiring TTL from now.
    async fn create(
        &self,
        actor_id: Uuid,
        intent_type: &str,
        draft_payload: serde_json::Map<String, serde_json::Value>,
        missing_fields: Vec<String>,
        follow_up_question: Option<String>,
    ) -> Result<PendingAction, AppError>;

    /// Merge supplied fields into an active record and reset the expiry
    /// window. Fails with a conflict if the record is no longer `pending`
    /// (stale update attempt).
    async fn update(&self, pending_id: Uuid, patch: PendingUpdate)
    -> Result<PendingAction, AppError>;

    /// Idempotent transition to `completed`. No-op if already terminal.
    async fn complete(&self, pending_id: Uuid) -> Result<(), AppError>;

    /// Idempotent transition to `cancelled`. No-op if already terminal.
    async fn cancel(&self, pending_id: Uuid) -> Result<(), AppError>;

    /// Delete this actor's terminal records older than the retention
    /// window. Never touches `pending` rows; safe to call opportunistically
    /// and concurrently. Returns the number of rows removed.
    async fn purge_old(&self, actor_id: Uuid) -> Result<u64, AppError>;
}

#[derive(Clone)]
pub struct PgPendingActionStore {
    pool: PgPool,
}

impl PgPendingActionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PendingActionRow {
    id: Uuid,
    actor_id: Uuid,
    status: String,
    intent_type: String,
    draft_payload: serde_json::Value,
    missing_fields: serde_json::Value,
    follow_up_question: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl PendingActionRow {
    fn into_pending(self) -> Result<PendingAction, AppError> {
        let status = PendingStatus::parse(&self.status).ok_or_else(|| {
            AppError::Internal(format!("unrecognized pending status '{}'", self.status))
        })?;
        let draft_payload = match self.draft_payload {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        let missing_fields: Vec<String> =
            serde_json::from_value(self.missing_fields).unwrap_or_default();
        Ok(PendingAction {
            id: self.id,
            actor_id: self.actor_id,
            status,
            intent_type: self.intent_type,
            draft_payload,
            missing_fields,
            follow_up_question: self.follow_up_question,
            created_at: self.created_at,
            updated_at: self.updated_at,
            expires_at: self.expires_at,
        })
    }
}

const PENDING_COLUMNS: &str = "id, actor_id, status, intent_type, draft_payload, missing_fields, \
                               follow_up_question, created_at, updated_at, expires_at";

impl PendingActionStore for PgPendingActionStore {
    async fn get_active(&self, actor_id: Uuid) -> Result<Option<PendingAction>, AppError> {
        // Lazy expiry: no background sweep exists, so overdue records are
        // flipped exactly here, on lookup.
        let flipped = sqlx::query(
            "UPDATE pending_actions
             SET status = 'expired', updated_at = now()
             WHERE actor_id = $1 AND status = 'pending' AND expires_at < now()",
        )
        .bind(actor_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if flipped > 0 {
            tracing::debug!(actor_id = %actor_id, count = flipped, "expired overdue pending actions");
        }

        let row = sqlx::query_as::<_, PendingActionRow>(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_actions
             WHERE actor_id = $1 AND status = 'pending'
             ORDER BY created_at DESC
             LIMIT 1"
        ))
        .bind(actor_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PendingActionRow::into_pending).transpose()
    }

    async fn create(
        &self,
        actor_id: Uuid,
        intent_type: &str,
        draft_payload: serde_json::Map<String, serde_json::Value>,
        missing_fields: Vec<String>,
        follow_up_question: Option<String>,
    ) -> Result<PendingAction, AppError> {
        // Single-active invariant: supersede, never delete.
        let superseded = sqlx::query(
            "UPDATE pending_actions
             SET status = 'cancelled', updated_at = now()
             WHERE actor_id = $1 AND status = 'pending'",
        )
        .bind(actor_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if superseded > 0 {
            tracing::debug!(actor_id = %actor_id, count = superseded, "superseded earlier pending actions");
        }

        let now = Utc::now();
        let row = sqlx::query_as::<_, PendingActionRow>(&format!(
            "INSERT INTO pending_actions
             (id, actor_id, status, intent_type, draft_payload, missing_fields,
              follow_up_question, created_at, updated_at, expires_at)
             VALUES ($1, $2, 'pending', $3, $4, $5, $6, $7, $7, $8)
             RETURNING {PENDING_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(actor_id)
        .bind(intent_type)
        .bind(serde_json::Value::Object(draft_payload))
        .bind(serde_json::json!(missing_fields))
        .bind(follow_up_question)
        .bind(now)
        .bind(PendingAction::deadline_from(now))
        .fetch_one(&self.pool)
        .await?;

        row.into_pending()
    }

    async fn update(
        &self,
        pending_id: Uuid,
        patch: PendingUpdate,
    ) -> Result<PendingAction, AppError> {
        let now = Utc::now();
        let draft_payload = patch.draft_payload.map(serde_json::Value::Object);
        let missing_fields = patch
            .missing_fields
            .map(|fields| serde_json::json!(fields));

        let row = sqlx::query_as::<_, PendingActionRow>(&format!(
            "UPDATE pending_actions
             SET draft_payload = COALESCE($2, draft_payload),
                 missing_fields = COALESCE($3, missing_fields),
                 follow_up_question = COALESCE($4, follow_up_question),
                 updated_at = $5,
                 expires_at = $6
             WHERE id = $1 AND status = 'pending'
             RETURNING {PENDING_COLUMNS}"
        ))
        .bind(pending_id)
        .bind(draft_payload)
        .bind(missing_fields)
        .bind(patch.follow_up_question)
        .bind(now)
        .bind(PendingAction::deadline_from(now))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.into_pending(),
            None => Err(AppError::Conflict {
                message: "The pending action is no longer active and cannot be updated."
                    .to_string(),
                field: None,
                received: Some(serde_json::Value::String(pending_id.to_string())),
            }),
        }
    }

    async fn complete(&self, pending_id: Uuid) -> Result<(), AppError> {
        self.set_terminal(pending_id, PendingStatus::Completed).await
    }

    async fn cancel(&self, pending_id: Uuid) -> Result<(), AppError> {
        self.set_terminal(pending_id, PendingStatus::Cancelled).await
    }

    async fn purge_old(&self, actor_id: Uuid) -> Result<u64, AppError> {
        let cutoff = PendingAction::retention_cutoff(Utc::now());
        let removed = sqlx::query(
            "DELETE FROM pending_actions
             WHERE actor_id = $1 AND status <> 'pending' AND updated_at < $2",
        )
        .bind(actor_id)
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(removed)
    }
}

impl PgPendingActionStore {
    /// The `status = 'pending'` guard makes repeated calls no-ops: a record
    /// already in a terminal state is left untouched, never errored on.
    async fn set_terminal(&self, pending_id: Uuid, status: PendingStatus) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE pending_actions
             SET status = $2, updated_at = now()
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(pending_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
