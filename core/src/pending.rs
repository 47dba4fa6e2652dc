use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Inactivity window after which a pending record becomes eligible for
/// lazy expiry. Extended on every slot-filling update.
pub const PENDING_TTL_MINUTES: i64 = 5;

/// Terminal records older than this (by `updated_at`) are permanently
/// deleted by the retention purge.
pub const PENDING_RETENTION_HOURS: i64 = 24;

/// Lifecycle status of a pending action. `Completed`, `Cancelled` and
/// `Expired` are terminal — once there, a record only changes by deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    Pending,
    Completed,
    Cancelled,
    Expired,
}

impl PendingStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A durable, in-flight write intent that is still missing required fields.
/// At most one `pending` record exists per actor; creating a new one
/// cancels (never deletes) the previous one.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PendingAction {
    pub id: Uuid,
    /// Actor the intent belongs to
    pub actor_id: Uuid,
    pub status: PendingStatus,
    /// Action family, e.g. "create_task"
    pub intent_type: String,
    /// Field name → value, accumulated across turns
    #[schema(value_type = Object)]
    pub draft_payload: serde_json::Map<String, serde_json::Value>,
    /// Field names still required before the intent can be confirmed
    pub missing_fields: Vec<String>,
    /// Prompt to surface to the user asking for the next missing field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_question: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Recomputed (extended) on every update
    pub expires_at: DateTime<Utc>,
}

impl PendingAction {
    /// Expiry predicate shared by every store implementation, so that the
    /// SQL flip and in-memory fakes agree on what "expired" means.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == PendingStatus::Pending && self.expires_at < now
    }

    /// The expiry deadline for a record created or updated at `now`.
    pub fn deadline_from(now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::minutes(PENDING_TTL_MINUTES)
    }

    /// `updated_at` cutoff for the retention purge at `now`.
    pub fn retention_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::hours(PENDING_RETENTION_HOURS)
    }
}

/// Slot-filling patch applied to an active pending record. `None` fields
/// are left untouched; the expiry window is always reset.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct PendingUpdate {
    #[schema(value_type = Option<Object>)]
    pub draft_payload: Option<serde_json::Map<String, serde_json::Value>>,
    pub missing_fields: Option<Vec<String>>,
    pub follow_up_question: Option<String>,
}
