//! Confirmation executor: given a fully-specified `{action_type, payload}`,
//! independently re-validate and apply exactly one state change.
//!
//! The payload is validated purely on its own content regardless of what
//! any pending record accumulated. Validation and authorization run before
//! any storage access; the primary write is the transaction boundary, and
//! the assignment link / audit entry are fire-and-forget secondaries.

use serde_json::json;
use uuid::Uuid;

use opsdesk_core::actions::{ActionRequest, ActionResult, ActionType};
use opsdesk_core::records::{
    ActorRole, NewAuditEntry, NewProgramme, NewTask, ProgrammeStatus, TaskPriority, TaskStatus,
};
use opsdesk_core::validate;

use crate::broker::records::{ProgrammeFieldChange, RecordStore, RoleDirectory};
use crate::error::AppError;

/// Updatable programme fields. `status` is deliberately absent — status
/// moves through its own action with its own audit shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProgrammeField {
    Name,
    Description,
    StartDate,
    EndDate,
}

impl ProgrammeField {
    const ALLOWED: &'static [&'static str] = &["name", "description", "start_date", "end_date"];

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "name" => Some(Self::Name),
            "description" => Some(Self::Description),
            "start_date" => Some(Self::StartDate),
            "end_date" => Some(Self::EndDate),
            _ => None,
        }
    }
}

/// Dispatch entry point. Unknown action tags are a client error, never
/// silently ignored; the match below is exhaustive over the closed set.
pub async fn execute_action<S>(
    store: &S,
    actor_id: Uuid,
    request: &ActionRequest,
) -> Result<ActionResult, AppError>
where
    S: RecordStore + RoleDirectory,
{
    let action = ActionType::parse(&request.action_type).ok_or_else(|| AppError::UnknownAction {
        received: request.action_type.clone(),
    })?;

    let payload = &request.payload;
    match action {
        ActionType::CreateTask => create_task(store, actor_id, payload).await,
        ActionType::UpdateTaskStatus => update_task_status(store, actor_id, payload).await,
        ActionType::CreateProgramme => create_programme(store, actor_id, payload).await,
        ActionType::UpdateProgrammeStatus => {
            update_programme_status(store, actor_id, payload).await
        }
        ActionType::UpdateProgrammeFields => {
            update_programme_fields(store, actor_id, payload).await
        }
    }
}

fn text_field<'a>(
    payload: &'a serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Option<&'a str> {
    payload.get(key).and_then(serde_json::Value::as_str)
}

/// Role gate for programme actions. The role is re-fetched here, at
/// execution time; the error never reveals the actor's actual role.
async fn require_manager<S: RoleDirectory>(
    store: &S,
    actor_id: Uuid,
    action: ActionType,
) -> Result<(), AppError> {
    match store.role_of(actor_id).await? {
        Some(role) if role >= ActorRole::Manager => Ok(()),
        role => {
            tracing::warn!(
                actor_id = %actor_id,
                action = action.as_str(),
                role_found = role.is_some(),
                "role gate rejected action"
            );
            Err(AppError::Forbidden {
                message: "Insufficient role for this action.".to_string(),
            })
        }
    }
}

/// Best-effort audit write. The primary write already succeeded and is the
/// user-visible source of truth, so failures here are logged and swallowed.
async fn write_audit<S: RecordStore>(store: &S, entry: NewAuditEntry) {
    if let Err(err) = store.insert_audit(&entry).await {
        tracing::warn!(
            action = %entry.action,
            entity_id = %entry.entity_id,
            error = ?err,
            "audit entry write failed; primary write already applied"
        );
    }
}

async fn create_task<S: RecordStore>(
    store: &S,
    actor_id: Uuid,
    payload: &serde_json::Map<String, serde_json::Value>,
) -> Result<ActionResult, AppError> {
    let title = validate::require_title("title", text_field(payload, "title"))?;
    let description = validate::optional_text(text_field(payload, "description"));
    // Priority is optional and advisory: anything outside the allow-list
    // falls back to the documented default instead of failing the action.
    let priority = text_field(payload, "priority")
        .and_then(TaskPriority::parse)
        .unwrap_or_default();
    let due_date = validate::optional_date("due_date", text_field(payload, "due_date"))?;
    // Absent (or null) means self-assign; a present value must be a valid
    // reference, never coerced into a default.
    let assignee_id = match payload.get("assignee_id") {
        None | Some(serde_json::Value::Null) => actor_id,
        Some(value) => {
            let raw = value
                .as_str()
                .ok_or_else(|| validate::FieldError::BadReference {
                    field: "assignee_id".to_string(),
                    received: value.to_string(),
                })?;
            validate::require_reference("assignee_id", Some(raw))?
        }
    };

    let task = store
        .insert_task(&NewTask {
            created_by: actor_id,
            title,
            description,
            priority,
            due_date,
        })
        .await?;

    if let Err(err) = store.insert_assignment(task.id, assignee_id, actor_id).await {
        tracing::warn!(
            task_id = %task.id,
            assignee_id = %assignee_id,
            error = ?err,
            "assignment link write failed; task already created"
        );
    }
    write_audit(
        store,
        NewAuditEntry {
            actor_id,
            action: ActionType::CreateTask.as_str().to_string(),
            entity_type: "task".to_string(),
            entity_id: task.id,
            detail: json!({ "title": task.title, "assignee_id": assignee_id }),
        },
    )
    .await;

    Ok(ActionResult::ok_with_href(
        format!("Created task \"{}\".", task.title),
        format!("/tasks/{}", task.id),
    ))
}

async fn update_task_status<S: RecordStore>(
    store: &S,
    actor_id: Uuid,
    payload: &serde_json::Map<String, serde_json::Value>,
) -> Result<ActionResult, AppError> {
    let task_id = validate::require_reference("task_id", text_field(payload, "task_id"))?;
    let new_status = validate::require_enum(
        "new_status",
        text_field(payload, "new_status"),
        TaskStatus::ALLOWED,
        TaskStatus::parse,
    )?;

    let task = store
        .fetch_task(task_id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            entity: "task",
            id: task_id.to_string(),
        })?;

    store.update_task_status(task_id, new_status).await?;
    write_audit(
        store,
        NewAuditEntry {
            actor_id,
            action: ActionType::UpdateTaskStatus.as_str().to_string(),
            entity_type: "task".to_string(),
            entity_id: task_id,
            detail: json!({ "from": task.status.as_str(), "to": new_status.as_str() }),
        },
    )
    .await;

    Ok(ActionResult::ok_with_href(
        format!("Updated task \"{}\" to {}.", task.title, new_status.as_str()),
        format!("/tasks/{task_id}"),
    ))
}

async fn create_programme<S>(
    store: &S,
    actor_id: Uuid,
    payload: &serde_json::Map<String, serde_json::Value>,
) -> Result<ActionResult, AppError>
where
    S: RecordStore + RoleDirectory,
{
    require_manager(store, actor_id, ActionType::CreateProgramme).await?;

    let name = validate::require_title("name", text_field(payload, "name"))?;
    let description = validate::optional_text(text_field(payload, "description"));

    let programme = store
        .insert_programme(&NewProgramme {
            created_by: actor_id,
            name,
            description,
        })
        .await?;

    write_audit(
        store,
        NewAuditEntry {
            actor_id,
            action: ActionType::CreateProgramme.as_str().to_string(),
            entity_type: "programme".to_string(),
            entity_id: programme.id,
            detail: json!({ "name": programme.name }),
        },
    )
    .await;

    Ok(ActionResult::ok_with_href(
        format!("Created programme \"{}\".", programme.name),
        format!("/programmes/{}", programme.id),
    ))
}

async fn update_programme_status<S>(
    store: &S,
    actor_id: Uuid,
    payload: &serde_json::Map<String, serde_json::Value>,
) -> Result<ActionResult, AppError>
where
    S: RecordStore + RoleDirectory,
{
    require_manager(store, actor_id, ActionType::UpdateProgrammeStatus).await?;

    let programme_id =
        validate::require_reference("programme_id", text_field(payload, "programme_id"))?;
    let new_status = validate::require_enum(
        "new_status",
        text_field(payload, "new_status"),
        ProgrammeStatus::ALLOWED,
        ProgrammeStatus::parse,
    )?;

    let programme = store
        .fetch_programme(programme_id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            entity: "programme",
            id: programme_id.to_string(),
        })?;

    store.update_programme_status(programme_id, new_status).await?;
    write_audit(
        store,
        NewAuditEntry {
            actor_id,
            action: ActionType::UpdateProgrammeStatus.as_str().to_string(),
            entity_type: "programme".to_string(),
            entity_id: programme_id,
            detail: json!({ "from": programme.status.as_str(), "to": new_status.as_str() }),
        },
    )
    .await;

    Ok(ActionResult::ok_with_href(
        format!(
            "Updated programme \"{}\" to {}.",
            programme.name,
            new_status.as_str()
        ),
        format!("/programmes/{programme_id}"),
    ))
}

async fn update_programme_fields<S>(
    store: &S,
    actor_id: Uuid,
    payload: &serde_json::Map<String, serde_json::Value>,
) -> Result<ActionResult, AppError>
where
    S: RecordStore + RoleDirectory,
{
    require_manager(store, actor_id, ActionType::UpdateProgrammeFields).await?;

    let programme_id =
        validate::require_reference("programme_id", text_field(payload, "programme_id"))?;
    let field = validate::require_enum(
        "update_field",
        text_field(payload, "update_field"),
        ProgrammeField::ALLOWED,
        ProgrammeField::parse,
    )?;

    // The value is type-checked for the parsed field before any storage
    // access; only the uniqueness check below genuinely needs storage.
    let raw_value = text_field(payload, "update_value");
    let change = match field {
        ProgrammeField::Name => {
            ProgrammeFieldChange::Name(validate::require_title("update_value", raw_value)?)
        }
        ProgrammeField::Description => {
            ProgrammeFieldChange::Description(validate::optional_text(raw_value))
        }
        ProgrammeField::StartDate => {
            ProgrammeFieldChange::StartDate(validate::optional_date("update_value", raw_value)?)
        }
        ProgrammeField::EndDate => {
            ProgrammeFieldChange::EndDate(validate::optional_date("update_value", raw_value)?)
        }
    };

    let programme = store
        .fetch_programme(programme_id)
        .await?
        .ok_or_else(|| AppError::NotFound {
            entity: "programme",
            id: programme_id.to_string(),
        })?;

    if let ProgrammeFieldChange::Name(name) = &change {
        if store.programme_name_taken(name, programme_id).await? {
            return Err(AppError::Conflict {
                message: format!(
                    "A programme named \"{name}\" already exists. Choose a different name."
                ),
                field: Some("update_value".to_string()),
                received: Some(serde_json::Value::String(name.clone())),
            });
        }
    }

    let old_value = match field {
        ProgrammeField::Name => json!(programme.name),
        ProgrammeField::Description => json!(programme.description),
        ProgrammeField::StartDate => json!(programme.start_date),
        ProgrammeField::EndDate => json!(programme.end_date),
    };
    let new_value = match &change {
        ProgrammeFieldChange::Name(name) => json!(name),
        ProgrammeFieldChange::Description(description) => json!(description),
        ProgrammeFieldChange::StartDate(date) => json!(date),
        ProgrammeFieldChange::EndDate(date) => json!(date),
    };

    store.update_programme_field(programme_id, &change).await?;
    write_audit(
        store,
        NewAuditEntry {
            actor_id,
            action: ActionType::UpdateProgrammeFields.as_str().to_string(),
            entity_type: "programme".to_string(),
            entity_id: programme_id,
            detail: json!({
                "field": change.field_name(),
                "from": old_value,
                "to": new_value,
            }),
        },
    )
    .await;

    Ok(ActionResult::ok_with_href(
        format!(
            "Updated {} on programme \"{}\".",
            change.field_name(),
            programme.name
        ),
        format!("/programmes/{programme_id}"),
    ))
}
