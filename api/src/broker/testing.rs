//! In-memory store fakes for unit tests. They mirror the semantics of the
//! Postgres implementations (same invariants, same error categories) so
//! the broker logic can be exercised without a live database.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use opsdesk_core::pending::{PendingAction, PendingStatus, PendingUpdate};
use opsdesk_core::records::{
    ActorRole, AssignmentLink, NewAuditEntry, NewProgramme, NewTask, Programme, ProgrammeStatus,
    Task, TaskPriority, TaskStatus,
};

use crate::broker::pending::PendingActionStore;
use crate::broker::records::{ProgrammeFieldChange, RecordStore, RoleDirectory};
use crate::error::AppError;

fn store_outage() -> AppError {
    AppError::Internal("simulated store outage".to_string())
}

#[derive(Default)]
pub struct MemoryPendingStore {
    records: Mutex<Vec<PendingAction>>,
}

impl MemoryPendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_of(&self, id: Uuid) -> Option<PendingStatus> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.status)
    }

    pub fn expires_at_of(&self, id: Uuid) -> Option<DateTime<Utc>> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .map(|r| r.expires_at)
    }

    /// Move a record's deadline into the past, simulating an idle actor.
    pub fn force_expiry(&self, id: Uuid) {
        self.shift_expiry(id, Duration::minutes(-30));
    }

    pub fn shift_expiry(&self, id: Uuid, delta: Duration) {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.iter_mut().find(|r| r.id == id) {
            record.expires_at += delta;
        }
    }

    /// Age a record's `updated_at`, simulating an old terminal record.
    pub fn backdate_updated(&self, id: Uuid, age: Duration) {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.iter_mut().find(|r| r.id == id) {
            record.updated_at -= age;
        }
    }
}

impl PendingActionStore for MemoryPendingStore {
    async fn get_active(&self, actor_id: Uuid) -> Result<Option<PendingAction>, AppError> {
        let now = Utc::now();
        let mut records = self.records.lock().unwrap();
        for record in records.iter_mut() {
            if record.actor_id == actor_id && record.is_expired(now) {
                record.status = PendingStatus::Expired;
                record.updated_at = now;
            }
        }
        Ok(records
            .iter()
            .filter(|r| r.actor_id == actor_id && r.status == PendingStatus::Pending)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn create(
        &self,
        actor_id: Uuid,
        intent_type: &str,
        draft_payload: serde_json::Map<String, serde_json::Value>,
        missing_fields: Vec<String>,
        follow_up_question: Option<String>,
    ) -> Result<PendingAction, AppError> {
        let now = Utc::now();
        let mut records = self.records.lock().unwrap();
        for record in records.iter_mut() {
            if record.actor_id == actor_id && record.status == PendingStatus::Pending {
                record.status = PendingStatus::Cancelled;
                record.updated_at = now;
            }
        }
        let record = PendingAction {
            id: Uuid::now_v7(),
            actor_id,
            status: PendingStatus::Pending,
            intent_type: intent_type.to_string(),
            draft_payload,
            missing_fields,
            follow_up_question,
            created_at: now,
            updated_at: now,
            expires_at: PendingAction::deadline_from(now),
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        pending_id: Uuid,
        patch: PendingUpdate,
    ) -> Result<PendingAction, AppError> {
        let now = Utc::now();
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|r| r.id == pending_id && r.status == PendingStatus::Pending)
            .ok_or_else(|| AppError::Conflict {
                message: "The pending action is no longer active and cannot be updated."
                    .to_string(),
                field: None,
                received: Some(serde_json::Value::String(pending_id.to_string())),
            })?;
        if let Some(draft_payload) = patch.draft_payload {
            record.draft_payload = draft_payload;
        }
        if let Some(missing_fields) = patch.missing_fields {
            record.missing_fields = missing_fields;
        }
        if let Some(follow_up_question) = patch.follow_up_question {
            record.follow_up_question = Some(follow_up_question);
        }
        record.updated_at = now;
        record.expires_at = PendingAction::deadline_from(now);
        Ok(record.clone())
    }

    async fn complete(&self, pending_id: Uuid) -> Result<(), AppError> {
        self.set_terminal(pending_id, PendingStatus::Completed);
        Ok(())
    }

    async fn cancel(&self, pending_id: Uuid) -> Result<(), AppError> {
        self.set_terminal(pending_id, PendingStatus::Cancelled);
        Ok(())
    }

    async fn purge_old(&self, actor_id: Uuid) -> Result<u64, AppError> {
        let cutoff = PendingAction::retention_cutoff(Utc::now());
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| {
            !(r.actor_id == actor_id && r.status.is_terminal() && r.updated_at < cutoff)
        });
        Ok((before - records.len()) as u64)
    }
}

impl MemoryPendingStore {
    fn set_terminal(&self, pending_id: Uuid, status: PendingStatus) {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records
            .iter_mut()
            .find(|r| r.id == pending_id && r.status == PendingStatus::Pending)
        {
            record.status = status;
            record.updated_at = Utc::now();
        }
    }
}

#[derive(Default)]
pub struct MemoryRecords {
    pub tasks: Mutex<Vec<Task>>,
    pub programmes: Mutex<Vec<Programme>>,
    pub assignments: Mutex<Vec<AssignmentLink>>,
    pub audits: Mutex<Vec<NewAuditEntry>>,
    roles: Mutex<HashMap<Uuid, ActorRole>>,
    fetches: AtomicUsize,
    fail_audit: AtomicBool,
    fail_primary: AtomicBool,
}

impl MemoryRecords {
    pub fn set_role(&self, actor_id: Uuid, role: ActorRole) {
        self.roles.lock().unwrap().insert(actor_id, role);
    }

    /// Make audit-entry writes fail while leaving primary writes intact.
    pub fn fail_audit(&self) {
        self.fail_audit.store(true, Ordering::SeqCst);
    }

    /// Make primary record writes fail (store unavailable).
    pub fn fail_primary(&self) {
        self.fail_primary.store(true, Ordering::SeqCst);
    }

    /// Number of fetch-by-id calls issued against task/programme stores.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().unwrap().is_empty() && self.programmes.lock().unwrap().is_empty()
    }

    pub fn seed_task(&self, created_by: Uuid, title: &str) -> Task {
        let now = Utc::now();
        let task = Task {
            id: Uuid::now_v7(),
            created_by,
            title: title.to_string(),
            description: None,
            status: TaskStatus::Open,
            priority: TaskPriority::Normal,
            due_date: None,
            created_at: now,
            updated_at: now,
        };
        self.tasks.lock().unwrap().push(task.clone());
        task
    }

    pub fn seed_programme(&self, created_by: Uuid, name: &str) -> Programme {
        let now = Utc::now();
        let programme = Programme {
            id: Uuid::now_v7(),
            created_by,
            name: name.to_string(),
            description: None,
            status: ProgrammeStatus::Planned,
            start_date: None,
            end_date: None,
            created_at: now,
            updated_at: now,
        };
        self.programmes.lock().unwrap().push(programme.clone());
        programme
    }

    fn check_primary(&self) -> Result<(), AppError> {
        if self.fail_primary.load(Ordering::SeqCst) {
            return Err(store_outage());
        }
        Ok(())
    }
}

impl RecordStore for MemoryRecords {
    async fn insert_task(&self, task: &NewTask) -> Result<Task, AppError> {
        self.check_primary()?;
        let now = Utc::now();
        let record = Task {
            id: Uuid::now_v7(),
            created_by: task.created_by,
            title: task.title.clone(),
            description: task.description.clone(),
            status: TaskStatus::Open,
            priority: task.priority,
            due_date: task.due_date,
            created_at: now,
            updated_at: now,
        };
        self.tasks.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn fetch_task(&self, id: Uuid) -> Result<Option<Task>, AppError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.tasks.lock().unwrap().iter().find(|t| t.id == id).cloned())
    }

    async fn update_task_status(&self, id: Uuid, status: TaskStatus) -> Result<(), AppError> {
        self.check_primary()?;
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.iter_mut().find(|t| t.id == id) {
            task.status = status;
            task.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_programme(&self, programme: &NewProgramme) -> Result<Programme, AppError> {
        self.check_primary()?;
        let now = Utc::now();
        let record = Programme {
            id: Uuid::now_v7(),
            created_by: programme.created_by,
            name: programme.name.clone(),
            description: programme.description.clone(),
            status: ProgrammeStatus::Planned,
            start_date: None,
            end_date: None,
            created_at: now,
            updated_at: now,
        };
        self.programmes.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn fetch_programme(&self, id: Uuid) -> Result<Option<Programme>, AppError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .programmes
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn update_programme_status(
        &self,
        id: Uuid,
        status: ProgrammeStatus,
    ) -> Result<(), AppError> {
        self.check_primary()?;
        let mut programmes = self.programmes.lock().unwrap();
        if let Some(programme) = programmes.iter_mut().find(|p| p.id == id) {
            programme.status = status;
            programme.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn update_programme_field(
        &self,
        id: Uuid,
        change: &ProgrammeFieldChange,
    ) -> Result<(), AppError> {
        self.check_primary()?;
        let mut programmes = self.programmes.lock().unwrap();
        if let Some(programme) = programmes.iter_mut().find(|p| p.id == id) {
            match change {
                ProgrammeFieldChange::Name(name) => programme.name = name.clone(),
                ProgrammeFieldChange::Description(description) => {
                    programme.description = description.clone();
                }
                ProgrammeFieldChange::StartDate(date) => programme.start_date = *date,
                ProgrammeFieldChange::EndDate(date) => programme.end_date = *date,
            }
            programme.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn programme_name_taken(&self, name: &str, exclude: Uuid) -> Result<bool, AppError> {
        Ok(self
            .programmes
            .lock()
            .unwrap()
            .iter()
            .any(|p| p.id != exclude && p.name.eq_ignore_ascii_case(name)))
    }

    async fn insert_assignment(
        &self,
        task_id: Uuid,
        assignee_id: Uuid,
        assigned_by: Uuid,
    ) -> Result<AssignmentLink, AppError> {
        let link = AssignmentLink {
            id: Uuid::now_v7(),
            task_id,
            assignee_id,
            assigned_by,
            created_at: Utc::now(),
        };
        self.assignments.lock().unwrap().push(link.clone());
        Ok(link)
    }

    async fn insert_audit(&self, entry: &NewAuditEntry) -> Result<(), AppError> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(store_outage());
        }
        self.audits.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

impl RoleDirectory for MemoryRecords {
    async fn role_of(&self, actor_id: Uuid) -> Result<Option<ActorRole>, AppError> {
        Ok(self.roles.lock().unwrap().get(&actor_id).copied())
    }
}
