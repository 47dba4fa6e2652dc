//! Record-store boundary: per-entity persistence for tasks, programmes,
//! assignment links, audit entries, and the fresh role lookup.
//!
//! The broker's contract with each store is deliberately narrow: insert
//! with named fields, fetch-by-id returning `None` on miss, update-by-id.
//! No multi-record transactions are issued across stores — each write
//! commits independently, which is why secondary-write failures are
//! tolerated instead of compensated.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use opsdesk_core::records::{
    ActorRole, AssignmentLink, NewAuditEntry, NewProgramme, NewTask, Programme, ProgrammeStatus,
    Task, TaskPriority, TaskStatus,
};

use crate::error::AppError;

/// A typed single-field change to a programme, produced by the executor
/// after allow-list and per-field type validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgrammeFieldChange {
    Name(String),
    Description(Option<String>),
    StartDate(Option<NaiveDate>),
    EndDate(Option<NaiveDate>),
}

impl ProgrammeFieldChange {
    pub const fn field_name(&self) -> &'static str {
        match self {
            Self::Name(_) => "name",
            Self::Description(_) => "description",
            Self::StartDate(_) => "start_date",
            Self::EndDate(_) => "end_date",
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait RecordStore {
    async fn insert_task(&self, task: &NewTask) -> Result<Task, AppError>;
    async fn fetch_task(&self, id: Uuid) -> Result<Option<Task>, AppError>;
    async fn update_task_status(&self, id: Uuid, status: TaskStatus) -> Result<(), AppError>;

    async fn insert_programme(&self, programme: &NewProgramme) -> Result<Programme, AppError>;
    async fn fetch_programme(&self, id: Uuid) -> Result<Option<Programme>, AppError>;
    async fn update_programme_status(
        &self,
        id: Uuid,
        status: ProgrammeStatus,
    ) -> Result<(), AppError>;
    async fn update_programme_field(
        &self,
        id: Uuid,
        change: &ProgrammeFieldChange,
    ) -> Result<(), AppError>;
    /// Case-insensitive name collision check, excluding the programme
    /// being renamed.
    async fn programme_name_taken(&self, name: &str, exclude: Uuid) -> Result<bool, AppError>;

    async fn insert_assignment(
        &self,
        task_id: Uuid,
        assignee_id: Uuid,
        assigned_by: Uuid,
    ) -> Result<AssignmentLink, AppError>;
    async fn insert_audit(&self, entry: &NewAuditEntry) -> Result<(), AppError>;
}

/// Fresh role classification for an actor. Queried at execution time for
/// every role-gated action — role claims baked into payloads or cached
/// from earlier turns are never trusted.
#[allow(async_fn_in_trait)]
pub trait RoleDirectory {
    async fn role_of(&self, actor_id: Uuid) -> Result<Option<ActorRole>, AppError>;
}

#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    created_by: Uuid,
    title: String,
    description: Option<String>,
    status: String,
    priority: String,
    due_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TaskRow {
    fn into_task(self) -> Result<Task, AppError> {
        let status = TaskStatus::parse(&self.status)
            .ok_or_else(|| AppError::Internal(format!("unrecognized task status '{}'", self.status)))?;
        let priority = TaskPriority::parse(&self.priority).unwrap_or_default();
        Ok(Task {
            id: self.id,
            created_by: self.created_by,
            title: self.title,
            description: self.description,
            status,
            priority,
            due_date: self.due_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProgrammeRow {
    id: Uuid,
    created_by: Uuid,
    name: String,
    description: Option<String>,
    status: String,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProgrammeRow {
    fn into_programme(self) -> Result<Programme, AppError> {
        let status = ProgrammeStatus::parse(&self.status).ok_or_else(|| {
            AppError::Internal(format!("unrecognized programme status '{}'", self.status))
        })?;
        Ok(Programme {
            id: self.id,
            created_by: self.created_by,
            name: self.name,
            description: self.description,
            status,
            start_date: self.start_date,
            end_date: self.end_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const TASK_COLUMNS: &str =
    "id, created_by, title, description, status, priority, due_date, created_at, updated_at";
const PROGRAMME_COLUMNS: &str =
    "id, created_by, name, description, status, start_date, end_date, created_at, updated_at";

impl RecordStore for PgRecordStore {
    async fn insert_task(&self, task: &NewTask) -> Result<Task, AppError> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "INSERT INTO tasks (id, created_by, title, description, status, priority, due_date)
             VALUES ($1, $2, $3, $4, 'open', $5, $6)
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(task.created_by)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.priority.as_str())
        .bind(task.due_date)
        .fetch_one(&self.pool)
        .await?;
        row.into_task()
    }

    async fn fetch_task(&self, id: Uuid) -> Result<Option<Task>, AppError> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TaskRow::into_task).transpose()
    }

    async fn update_task_status(&self, id: Uuid, status: TaskStatus) -> Result<(), AppError> {
        sqlx::query("UPDATE tasks SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_programme(&self, programme: &NewProgramme) -> Result<Programme, AppError> {
        let row = sqlx::query_as::<_, ProgrammeRow>(&format!(
            "INSERT INTO programmes (id, created_by, name, description, status)
             VALUES ($1, $2, $3, $4, 'planned')
             RETURNING {PROGRAMME_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(programme.created_by)
        .bind(&programme.name)
        .bind(&programme.description)
        .fetch_one(&self.pool)
        .await?;
        row.into_programme()
    }

    async fn fetch_programme(&self, id: Uuid) -> Result<Option<Programme>, AppError> {
        let row = sqlx::query_as::<_, ProgrammeRow>(&format!(
            "SELECT {PROGRAMME_COLUMNS} FROM programmes WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ProgrammeRow::into_programme).transpose()
    }

    async fn update_programme_status(
        &self,
        id: Uuid,
        status: ProgrammeStatus,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE programmes SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_programme_field(
        &self,
        id: Uuid,
        change: &ProgrammeFieldChange,
    ) -> Result<(), AppError> {
        let query = match change {
            ProgrammeFieldChange::Name(name) => {
                sqlx::query("UPDATE programmes SET name = $2, updated_at = now() WHERE id = $1")
                    .bind(id)
                    .bind(name)
            }
            ProgrammeFieldChange::Description(description) => sqlx::query(
                "UPDATE programmes SET description = $2, updated_at = now() WHERE id = $1",
            )
            .bind(id)
            .bind(description),
            ProgrammeFieldChange::StartDate(date) => sqlx::query(
                "UPDATE programmes SET start_date = $2, updated_at = now() WHERE id = $1",
            )
            .bind(id)
            .bind(*date),
            ProgrammeFieldChange::EndDate(date) => sqlx::query(
                "UPDATE programmes SET end_date = $2, updated_at = now() WHERE id = $1",
            )
            .bind(id)
            .bind(*date),
        };
        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn programme_name_taken(&self, name: &str, exclude: Uuid) -> Result<bool, AppError> {
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM programmes WHERE lower(name) = lower($1) AND id <> $2)",
        )
        .bind(name)
        .bind(exclude)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    async fn insert_assignment(
        &self,
        task_id: Uuid,
        assignee_id: Uuid,
        assigned_by: Uuid,
    ) -> Result<AssignmentLink, AppError> {
        let id = Uuid::now_v7();
        let created_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            "INSERT INTO task_assignments (id, task_id, assignee_id, assigned_by)
             VALUES ($1, $2, $3, $4)
             RETURNING created_at",
        )
        .bind(id)
        .bind(task_id)
        .bind(assignee_id)
        .bind(assigned_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(AssignmentLink {
            id,
            task_id,
            assignee_id,
            assigned_by,
            created_at,
        })
    }

    async fn insert_audit(&self, entry: &NewAuditEntry) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO audit_log (id, actor_id, action, entity_type, entity_id, detail)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(Uuid::now_v7())
        .bind(entry.actor_id)
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(entry.entity_id)
        .bind(&entry.detail)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl RoleDirectory for PgRecordStore {
    async fn role_of(&self, actor_id: Uuid) -> Result<Option<ActorRole>, AppError> {
        let role = sqlx::query_scalar::<_, String>("SELECT role FROM users WHERE id = $1")
            .bind(actor_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role.as_deref().and_then(ActorRole::parse))
    }
}
