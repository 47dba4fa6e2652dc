//! Fire-and-forget observability events for confirmed/failed actions.
//! Emission happens after the outcome is already decided; nothing here can
//! change the `ActionResult` returned to the caller.

use uuid::Uuid;

pub fn action_confirmed(actor_id: Uuid, action_type: &str, message: &str) {
    tracing::info!(
        event = "action_confirmed",
        actor_id = %actor_id,
        action = action_type,
        message = message,
        "assistant action confirmed"
    );
}

pub fn action_failed(actor_id: Uuid, action_type: &str, error_code: &str, detail: &str) {
    tracing::warn!(
        event = "action_failed",
        actor_id = %actor_id,
        action = action_type,
        error = error_code,
        detail = detail,
        "assistant action failed"
    );
}
