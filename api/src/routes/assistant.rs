//! Assistant endpoints: one conversational turn (classifier output in,
//! pending record out) and the explicit confirmation that turns a
//! fully-specified intent into a real state change.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use uuid::Uuid;

use opsdesk_core::actions::{ActionRequest, ActionResult, ActionType, ClassifiedIntent};
use opsdesk_core::pending::{PendingAction, PendingUpdate};
use opsdesk_core::validate;

use crate::broker::executor::execute_action;
use crate::broker::pending::{PendingActionStore, PgPendingActionStore};
use crate::broker::records::{PgRecordStore, RecordStore, RoleDirectory};
use crate::error::AppError;
use crate::extract::{AppJson, extract_actor_id};
use crate::state::AppState;
use crate::telemetry;

/// Routes that mutate state; rate limited more tightly than reads.
pub fn write_router() -> Router<AppState> {
    Router::new()
        .route("/v1/assistant/turn", post(assistant_turn))
        .route("/v1/assistant/confirm", post(confirm_action))
        .route("/v1/assistant/cancel", post(cancel_pending))
}

pub fn read_router() -> Router<AppState> {
    Router::new().route("/v1/assistant/pending", get(get_pending))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// Required fields are still missing; ask the follow-up question
    AwaitingFields,
    /// The draft is fully specified; the user should be asked to confirm
    ReadyToConfirm,
}

/// Outcome of one conversational turn.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TurnResponse {
    pub state: TurnState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_question: Option<String>,
    pub pending: PendingAction,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CancelResponse {
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_id: Option<Uuid>,
}

/// One conversational turn: store or slot-fill the classified intent.
///
/// The classifier's output is untrusted input. The intent family must be a
/// known action type, free text is sanitized before it is stored, and the
/// final payload will be re-validated from scratch at confirmation time.
async fn run_turn<P: PendingActionStore>(
    store: &P,
    actor_id: Uuid,
    intent: ClassifiedIntent,
) -> Result<TurnResponse, AppError> {
    let action = ActionType::parse(&intent.intent_type).ok_or_else(|| AppError::UnknownAction {
        received: intent.intent_type.clone(),
    })?;

    let draft_payload = validate::sanitize_payload(&intent.draft_payload);
    let missing_fields: Vec<String> = intent
        .missing_fields
        .iter()
        .map(|field| validate::sanitize_text(field, validate::TITLE_MAX_LEN))
        .filter(|field| !field.is_empty())
        .collect();
    let follow_up_question = validate::optional_text(intent.follow_up_question.as_deref());

    // Retention cleanup piggybacks on turns; a failed purge never blocks one.
    if let Err(err) = store.purge_old(actor_id).await {
        tracing::warn!(actor_id = %actor_id, error = ?err, "retention purge failed");
    }

    let active = store.get_active(actor_id).await?;
    let pending = match active {
        // Same intent family: slot-fill the existing record, overlaying the
        // newly supplied fields on the accumulated draft.
        Some(active) if active.intent_type == action.as_str() => {
            let mut merged = active.draft_payload.clone();
            for (key, value) in draft_payload {
                merged.insert(key, value);
            }
            store
                .update(
                    active.id,
                    PendingUpdate {
                        draft_payload: Some(merged),
                        missing_fields: Some(missing_fields),
                        follow_up_question: follow_up_question.clone(),
                    },
                )
                .await?
        }
        // New or switched intent: create, superseding whatever was active.
        _ => {
            store
                .create(
                    actor_id,
                    action.as_str(),
                    draft_payload,
                    missing_fields,
                    follow_up_question.clone(),
                )
                .await?
        }
    };

    let state = if pending.missing_fields.is_empty() {
        TurnState::ReadyToConfirm
    } else {
        TurnState::AwaitingFields
    };
    Ok(TurnResponse {
        state,
        follow_up_question: pending.follow_up_question.clone(),
        pending,
    })
}

/// Execute a confirmation and report the uniform outcome.
///
/// Success completes the actor's active pending record and emits a
/// confirmed telemetry event. Any failure emits a failed event and leaves
/// the pending record untouched so the user can retry without losing
/// slot-filled state.
async fn run_confirm<P, S>(
    pending_store: &P,
    records: &S,
    actor_id: Uuid,
    request: ActionRequest,
) -> (StatusCode, ActionResult)
where
    P: PendingActionStore,
    S: RecordStore + RoleDirectory,
{
    match execute_action(records, actor_id, &request).await {
        Ok(result) => {
            telemetry::action_confirmed(actor_id, &request.action_type, &result.message);
            match pending_store.get_active(actor_id).await {
                Ok(Some(active)) => {
                    if let Err(err) = pending_store.complete(active.id).await {
                        tracing::warn!(
                            pending_id = %active.id,
                            error = ?err,
                            "failed to mark pending action completed"
                        );
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        actor_id = %actor_id,
                        error = ?err,
                        "pending lookup failed after confirmation"
                    );
                }
            }
            (StatusCode::OK, result)
        }
        Err(err) => {
            let (status, code, message) = err.public_parts();
            telemetry::action_failed(actor_id, &request.action_type, code, &message);
            (status, ActionResult::failed(message, code))
        }
    }
}

/// Submit one classified conversational turn
#[utoipa::path(
    post,
    path = "/v1/assistant/turn",
    request_body = ClassifiedIntent,
    responses(
        (status = 200, description = "Pending intent stored or slot-filled", body = TurnResponse),
        (status = 400, description = "Unknown intent type or invalid body", body = opsdesk_core::error::ApiError)
    ),
    tag = "assistant"
)]
pub async fn assistant_turn(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(intent): AppJson<ClassifiedIntent>,
) -> Result<impl IntoResponse, AppError> {
    let actor_id = extract_actor_id(&headers)?;
    let store = PgPendingActionStore::new(state.db.clone());
    let response = run_turn(&store, actor_id, intent).await?;
    Ok(Json(response))
}

/// Fetch the actor's active pending intent, if any
#[utoipa::path(
    get,
    path = "/v1/assistant/pending",
    responses(
        (status = 200, description = "Active pending intent", body = PendingAction),
        (status = 404, description = "Nothing pending", body = opsdesk_core::error::ApiError)
    ),
    tag = "assistant"
)]
pub async fn get_pending(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let actor_id = extract_actor_id(&headers)?;
    let store = PgPendingActionStore::new(state.db.clone());
    match store.get_active(actor_id).await? {
        Some(pending) => Ok(Json(pending)),
        None => Err(AppError::NotFound {
            entity: "pending action",
            id: actor_id.to_string(),
        }),
    }
}

/// Confirm and execute a fully-specified action
#[utoipa::path(
    post,
    path = "/v1/assistant/confirm",
    request_body = ActionRequest,
    responses(
        (status = 200, description = "Action applied", body = ActionResult),
        (status = 400, description = "Validation failed or unknown action", body = ActionResult),
        (status = 403, description = "Role gate failed", body = ActionResult),
        (status = 404, description = "Referenced record not found", body = ActionResult),
        (status = 409, description = "Conflicting value", body = ActionResult)
    ),
    tag = "assistant"
)]
pub async fn confirm_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(request): AppJson<ActionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let actor_id = extract_actor_id(&headers)?;
    let pending_store = PgPendingActionStore::new(state.db.clone());
    let records = PgRecordStore::new(state.db.clone());
    let (status, result) = run_confirm(&pending_store, &records, actor_id, request).await;
    Ok((status, Json(result)))
}

/// Cancel the actor's active pending intent
#[utoipa::path(
    post,
    path = "/v1/assistant/cancel",
    responses(
        (status = 200, description = "Cancellation outcome", body = CancelResponse)
    ),
    tag = "assistant"
)]
pub async fn cancel_pending(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let actor_id = extract_actor_id(&headers)?;
    let store = PgPendingActionStore::new(state.db.clone());
    let response = match store.get_active(actor_id).await? {
        Some(active) => {
            store.cancel(active.id).await?;
            CancelResponse {
                cancelled: true,
                pending_id: Some(active.id),
            }
        }
        None => CancelResponse {
            cancelled: false,
            pending_id: None,
        },
    };
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::testing::{MemoryPendingStore, MemoryRecords};
    use opsdesk_core::pending::PendingStatus;
    use opsdesk_core::records::ActorRole;
    use serde_json::json;

    fn intent(
        intent_type: &str,
        payload: serde_json::Value,
        missing: &[&str],
        question: Option<&str>,
    ) -> ClassifiedIntent {
        let draft_payload = match payload {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        ClassifiedIntent {
            intent_type: intent_type.to_string(),
            draft_payload,
            missing_fields: missing.iter().map(|f| f.to_string()).collect(),
            follow_up_question: question.map(str::to_string),
        }
    }

    fn confirm_request(action_type: &str, payload: serde_json::Value) -> ActionRequest {
        let payload = match payload {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        ActionRequest {
            action_type: action_type.to_string(),
            payload,
        }
    }

    #[tokio::test]
    async fn incomplete_intent_is_stored_as_pending() {
        let store = MemoryPendingStore::new();
        let actor = Uuid::now_v7();

        let response = run_turn(
            &store,
            actor,
            intent(
                "create_task",
                json!({ "title": "" }),
                &["assignee_id"],
                Some("Who should this be assigned to?"),
            ),
        )
        .await
        .unwrap();

        assert_eq!(response.state, TurnState::AwaitingFields);
        assert_eq!(
            response.follow_up_question.as_deref(),
            Some("Who should this be assigned to?")
        );
        let active = store.get_active(actor).await.unwrap().unwrap();
        assert_eq!(active.status, PendingStatus::Pending);
        assert_eq!(active.missing_fields, vec!["assignee_id"]);
    }

    #[tokio::test]
    async fn slot_fill_merges_into_the_same_record() {
        let store = MemoryPendingStore::new();
        let actor = Uuid::now_v7();

        let first = run_turn(
            &store,
            actor,
            intent("create_task", json!({ "title": "Write report" }), &["assignee_id"], None),
        )
        .await
        .unwrap();

        let assignee = Uuid::now_v7();
        let second = run_turn(
            &store,
            actor,
            intent(
                "create_task",
                json!({ "assignee_id": assignee.to_string() }),
                &[],
                None,
            ),
        )
        .await
        .unwrap();

        assert_eq!(second.pending.id, first.pending.id);
        assert_eq!(second.state, TurnState::ReadyToConfirm);
        assert_eq!(
            second.pending.draft_payload.get("title"),
            Some(&json!("Write report"))
        );
        assert_eq!(
            second.pending.draft_payload.get("assignee_id"),
            Some(&json!(assignee.to_string()))
        );
    }

    #[tokio::test]
    async fn switching_intent_supersedes_the_previous_record() {
        let store = MemoryPendingStore::new();
        let actor = Uuid::now_v7();

        let first = run_turn(
            &store,
            actor,
            intent("create_task", json!({ "title": "" }), &["assignee_id"], None),
        )
        .await
        .unwrap();
        let second = run_turn(
            &store,
            actor,
            intent("create_programme", json!({}), &["name"], None),
        )
        .await
        .unwrap();

        assert_ne!(second.pending.id, first.pending.id);
        assert_eq!(store.status_of(first.pending.id), Some(PendingStatus::Cancelled));
        let active = store.get_active(actor).await.unwrap().unwrap();
        assert_eq!(active.id, second.pending.id);
    }

    #[tokio::test]
    async fn turn_rejects_unknown_intent_families() {
        let store = MemoryPendingStore::new();
        let err = run_turn(
            &store,
            Uuid::now_v7(),
            intent("summon_demons", json!({}), &[], None),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::UnknownAction { .. }));
    }

    #[tokio::test]
    async fn turn_sanitizes_classifier_text() {
        let store = MemoryPendingStore::new();
        let actor = Uuid::now_v7();

        let response = run_turn(
            &store,
            actor,
            intent(
                "create_task",
                json!({ "title": "<script>x</script>Ship it" }),
                &["assignee_id"],
                None,
            ),
        )
        .await
        .unwrap();

        assert_eq!(
            response.pending.draft_payload.get("title"),
            Some(&json!("xShip it"))
        );
    }

    #[tokio::test]
    async fn confirm_completes_the_active_pending_record() {
        let pending = MemoryPendingStore::new();
        let records = MemoryRecords::default();
        let actor = Uuid::now_v7();
        let assignee = Uuid::now_v7();

        let turn = run_turn(
            &pending,
            actor,
            intent(
                "create_task",
                json!({ "title": "Write report", "assignee_id": assignee.to_string() }),
                &[],
                None,
            ),
        )
        .await
        .unwrap();
        assert_eq!(turn.state, TurnState::ReadyToConfirm);

        let (status, result) = run_confirm(
            &pending,
            &records,
            actor,
            confirm_request(
                "create_task",
                json!({ "title": "Write report", "assignee_id": assignee.to_string() }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(result.success);
        assert_eq!(records.tasks.lock().unwrap().len(), 1);
        assert_eq!(records.assignments.lock().unwrap().len(), 1);
        assert_eq!(records.audits.lock().unwrap().len(), 1);
        assert_eq!(
            pending.status_of(turn.pending.id),
            Some(PendingStatus::Completed)
        );
        assert!(pending.get_active(actor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_confirmation_leaves_pending_state_for_retry() {
        let pending = MemoryPendingStore::new();
        let records = MemoryRecords::default();
        let actor = Uuid::now_v7();
        records.set_role(actor, ActorRole::Manager);

        let turn = run_turn(
            &pending,
            actor,
            intent("update_programme_status", json!({}), &[], None),
        )
        .await
        .unwrap();

        // Enum fails validation before any storage access.
        let (status, result) = run_confirm(
            &pending,
            &records,
            actor,
            confirm_request(
                "update_programme_status",
                json!({ "programme_id": Uuid::now_v7().to_string(), "new_status": "bogus" }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("validation_failed"));
        assert!(!result.message.is_empty());
        assert_eq!(records.fetch_count(), 0);
        // Slot-filled state survives for retry.
        assert_eq!(
            pending.status_of(turn.pending.id),
            Some(PendingStatus::Pending)
        );
    }

    #[tokio::test]
    async fn confirm_is_validated_independently_of_the_pending_record() {
        let pending = MemoryPendingStore::new();
        let records = MemoryRecords::default();
        let actor = Uuid::now_v7();

        // The pending record claims a perfectly valid draft...
        run_turn(
            &pending,
            actor,
            intent("create_task", json!({ "title": "Write report" }), &[], None),
        )
        .await
        .unwrap();

        // ...but the confirmation payload stands on its own and fails.
        let (status, result) = run_confirm(
            &pending,
            &records,
            actor,
            confirm_request("create_task", json!({ "title": "" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!result.success);
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn unknown_action_confirmation_reports_its_own_code() {
        let pending = MemoryPendingStore::new();
        let records = MemoryRecords::default();

        let (status, result) = run_confirm(
            &pending,
            &records,
            Uuid::now_v7(),
            confirm_request("delete_everything", json!({})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(result.error.as_deref(), Some("unknown_action"));
    }

    #[tokio::test]
    async fn expired_draft_is_not_completed_by_a_late_confirmation() {
        let pending = MemoryPendingStore::new();
        let records = MemoryRecords::default();
        let actor = Uuid::now_v7();

        let turn = run_turn(
            &pending,
            actor,
            intent("create_task", json!({ "title": "Write report" }), &[], None),
        )
        .await
        .unwrap();
        pending.force_expiry(turn.pending.id);

        let (status, result) = run_confirm(
            &pending,
            &records,
            actor,
            confirm_request("create_task", json!({ "title": "Write report" })),
        )
        .await;

        // The action itself still succeeds — the payload is self-contained.
        assert_eq!(status, StatusCode::OK);
        assert!(result.success);
        assert_eq!(pending.status_of(turn.pending.id), Some(PendingStatus::Expired));
    }
}
