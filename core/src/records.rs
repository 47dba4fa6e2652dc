use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Workflow status of a task. Closed set — free-form statuses are rejected
/// at the broker boundary, not coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Blocked,
    Done,
    Cancelled,
}

impl TaskStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        }
    }

    /// Case-normalized parse against the allow-list.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "in_progress" => Some(Self::InProgress),
            "blocked" => Some(Self::Blocked),
            "done" => Some(Self::Done),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub const ALLOWED: &'static [&'static str] =
        &["open", "in_progress", "blocked", "done", "cancelled"];
}

/// Priority of a task. Optional on input; invalid or absent values fall
/// back to `Normal` (documented default — priority is advisory, not gating).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl TaskPriority {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Lifecycle status of a programme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProgrammeStatus {
    Planned,
    Active,
    Paused,
    Completed,
    Archived,
}

impl ProgrammeStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "planned" => Some(Self::Planned),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    pub const ALLOWED: &'static [&'static str] =
        &["planned", "active", "paused", "completed", "archived"];
}

/// Role classification of an actor. Ordered: `Member < Manager < Admin`.
/// Programme actions require at least `Manager`. The role is always
/// re-fetched at execution time — never trusted from a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Member,
    Manager,
    Admin,
}

impl ActorRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Manager => "manager",
            Self::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "member" => Some(Self::Member),
            "manager" => Some(Self::Manager),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// A task record as stored. Tasks are owned by the record store; the broker
/// only creates them and moves their status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Task {
    pub id: Uuid,
    /// Actor who asked for the task to be created
    pub created_by: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a new task. The id is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub created_by: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDate>,
}

/// A programme record as stored.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Programme {
    pub id: Uuid,
    pub created_by: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: ProgrammeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a new programme.
#[derive(Debug, Clone)]
pub struct NewProgramme {
    pub created_by: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// Link record binding a task to its assignee. Written as a secondary
/// effect of `create_task`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssignmentLink {
    pub id: Uuid,
    pub task_id: Uuid,
    pub assignee_id: Uuid,
    pub assigned_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Structured audit trail entry. Written best-effort after every applied
/// action — a failed audit write never rolls back the primary write.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditEntry {
    pub id: Uuid,
    pub actor_id: Uuid,
    /// Action name, e.g. "create_task", "update_programme_status"
    pub action: String,
    /// Entity kind the action touched: "task" | "programme"
    pub entity_type: String,
    pub entity_id: Uuid,
    /// Before/after values where applicable, e.g. {"from": "open", "to": "done"}
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Fields for inserting an audit entry. Id and timestamp are assigned by
/// the store.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor_id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub detail: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ordering_gates_manager_actions() {
        assert!(ActorRole::Member < ActorRole::Manager);
        assert!(ActorRole::Admin >= ActorRole::Manager);
        assert!(ActorRole::Manager >= ActorRole::Manager);
    }

    #[test]
    fn status_parse_is_case_normalized() {
        assert_eq!(TaskStatus::parse("  In_Progress "), Some(TaskStatus::InProgress));
        assert_eq!(ProgrammeStatus::parse("ACTIVE"), Some(ProgrammeStatus::Active));
        assert_eq!(TaskStatus::parse("reopened"), None);
    }

    #[test]
    fn priority_falls_back_to_normal() {
        assert_eq!(TaskPriority::default(), TaskPriority::Normal);
        assert_eq!(TaskPriority::parse("someday"), None);
    }
}
