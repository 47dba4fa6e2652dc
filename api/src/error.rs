use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use opsdesk_core::error::{self, ApiError};
use opsdesk_core::validate::FieldError;

/// Internal error type that converts to structured API responses.
///
/// The taxonomy mirrors how the broker treats each failure: client/input
/// errors and authorization errors never reach storage, not-found means a
/// well-formed but stale reference, conflict means "pick another value",
/// and persistence errors are generic failures the caller may retry.
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Unknown action_type tag (400) — closed set, never silently ignored
    UnknownAction { received: String },
    /// Role gate failed (403). The actor's actual role is never echoed back.
    Forbidden { message: String },
    /// Referenced record does not exist (404)
    NotFound { entity: &'static str, id: String },
    /// Duplicate value (409) — the caller should prompt for a different one
    Conflict {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
    },
    /// Database error (500)
    Database(sqlx::Error),
    /// Internal error (500)
    Internal(String),
}

impl AppError {
    /// Status code, machine-readable error code, and user-displayable
    /// message for this error. Shared by the JSON error body and the
    /// uniform `ActionResult` failure path.
    pub fn public_parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            Self::Validation { message, .. } => (
                StatusCode::BAD_REQUEST,
                error::codes::VALIDATION_FAILED,
                message.clone(),
            ),
            Self::UnknownAction { received } => (
                StatusCode::BAD_REQUEST,
                error::codes::UNKNOWN_ACTION,
                format!("Unknown action type '{received}'"),
            ),
            Self::Forbidden { message } => (
                StatusCode::FORBIDDEN,
                error::codes::FORBIDDEN,
                message.clone(),
            ),
            Self::NotFound { entity, id } => (
                StatusCode::NOT_FOUND,
                error::codes::NOT_FOUND,
                format!("No {entity} found with id '{id}'"),
            ),
            Self::Conflict { message, .. } => {
                (StatusCode::CONFLICT, error::codes::CONFLICT, message.clone())
            }
            Self::Database(_) | Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                error::codes::INTERNAL_ERROR,
                "An internal error occurred".to_string(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();
        let (status, code, message) = self.public_parts();

        let api_error = match self {
            AppError::Validation {
                field,
                received,
                docs_hint,
                ..
            } => ApiError {
                error: code.to_string(),
                message,
                field,
                received,
                request_id,
                docs_hint,
            },
            AppError::UnknownAction { received } => ApiError {
                error: code.to_string(),
                message,
                field: Some("action_type".to_string()),
                received: Some(serde_json::Value::String(received)),
                request_id,
                docs_hint: Some(format!(
                    "action_type must be one of: {}",
                    opsdesk_core::actions::ActionType::ALLOWED.join(", ")
                )),
            },
            AppError::Forbidden { .. } => ApiError {
                error: code.to_string(),
                message,
                field: None,
                received: None,
                request_id,
                docs_hint: None,
            },
            AppError::NotFound { entity, id } => ApiError {
                error: code.to_string(),
                message,
                field: None,
                received: Some(serde_json::Value::String(id)),
                request_id,
                docs_hint: Some(format!(
                    "The {entity} reference was well-formed but no such record exists. \
                     It may have been deleted — re-fetch before retrying."
                )),
            },
            AppError::Conflict {
                field, received, ..
            } => ApiError {
                error: code.to_string(),
                message,
                field,
                received,
                request_id,
                docs_hint: None,
            },
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                ApiError {
                    error: code.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: None,
                }
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ApiError {
                    error: code.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: None,
                }
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl From<FieldError> for AppError {
    fn from(err: FieldError) -> Self {
        let message = err.to_string();
        let field = err.field().to_string();
        let received = err
            .received()
            .map(|value| serde_json::Value::String(value.to_string()));
        AppError::Validation {
            message,
            field: Some(field),
            received,
            docs_hint: None,
        }
    }
}
