use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The closed set of write actions the broker knows how to execute.
/// The wire tag stays a string so an unknown tag can be reported as its
/// own error category instead of a generic body-parse failure; dispatch
/// itself is an exhaustive `match` on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CreateTask,
    UpdateTaskStatus,
    CreateProgramme,
    UpdateProgrammeStatus,
    UpdateProgrammeFields,
}

impl ActionType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateTask => "create_task",
            Self::UpdateTaskStatus => "update_task_status",
            Self::CreateProgramme => "create_programme",
            Self::UpdateProgrammeStatus => "update_programme_status",
            Self::UpdateProgrammeFields => "update_programme_fields",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "create_task" => Some(Self::CreateTask),
            "update_task_status" => Some(Self::UpdateTaskStatus),
            "create_programme" => Some(Self::CreateProgramme),
            "update_programme_status" => Some(Self::UpdateProgrammeStatus),
            "update_programme_fields" => Some(Self::UpdateProgrammeFields),
            _ => None,
        }
    }

    pub const ALLOWED: &'static [&'static str] = &[
        "create_task",
        "update_task_status",
        "create_programme",
        "update_programme_status",
        "update_programme_fields",
    ];
}

/// A confirmation submission: which action to run and its payload.
/// The payload is re-validated from scratch at execution time regardless
/// of what any pending record accumulated — the pending record is a
/// convenience cache, not a trust boundary.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ActionRequest {
    /// One of [`ActionType::ALLOWED`]; anything else is an `unknown_action` error
    pub action_type: String,
    /// Action-specific fields, validated field-by-field by the executor
    #[serde(default)]
    #[schema(value_type = Object)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// Uniform outcome contract every action handler returns. Always carries a
/// short human-readable message suitable for direct display.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    /// Deep link to the affected record, when one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    /// Machine-readable error code on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            href: None,
            error: None,
        }
    }

    pub fn ok_with_href(message: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            href: Some(href.into()),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            href: None,
            error: Some(code.into()),
        }
    }
}

/// Output of the external intent classifier for one conversational turn.
/// Treated as untrusted input: text fields are sanitized before storage and
/// the payload is fully re-validated again at confirmation time.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ClassifiedIntent {
    /// Action family, e.g. "create_task"
    pub intent_type: String,
    /// Fields the classifier extracted from the user's message
    #[serde(default)]
    #[schema(value_type = Object)]
    pub draft_payload: serde_json::Map<String, serde_json::Value>,
    /// Required fields the classifier could not fill, in ask-order
    #[serde(default)]
    pub missing_fields: Vec<String>,
    /// Prompt asking the user for the next missing field
    #[serde(default)]
    pub follow_up_question: Option<String>,
}
