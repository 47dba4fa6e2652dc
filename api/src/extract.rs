//! Custom extractors that convert axum rejections to structured AppError
//! responses, plus actor identity extraction.
//!
//! Use `AppJson<T>` as a drop-in replacement for `axum::Json<T>` in handler
//! signatures. Unlike the standard extractor, deserialization failures
//! produce a JSON `AppError` instead of axum's default plain-text 422.

use axum::http::HeaderMap;
use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};
use uuid::Uuid;

use crate::error::AppError;

/// JSON extractor that converts deserialization errors to structured
/// `AppError` responses.
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(map_json_rejection(rejection)),
        }
    }
}

/// Convert a `JsonRejection` to a structured `AppError::Validation`.
pub fn map_json_rejection(rejection: JsonRejection) -> AppError {
    let body_text = rejection.body_text();
    let field_hint = extract_field_from_serde_message(&body_text);

    AppError::Validation {
        message: format!("Invalid request body: {body_text}"),
        field: Some(field_hint.unwrap_or("body".to_string())),
        received: None,
        docs_hint: Some(
            "Check the request body against the endpoint's schema (GET /openapi.json)."
                .to_string(),
        ),
    }
}

/// Extract the acting user from the `x-actor-id` header.
/// In production this comes from the session layer in front of the API;
/// the broker itself only needs the resolved actor id — role is always
/// looked up fresh from the users table, never taken from the request.
pub fn extract_actor_id(headers: &HeaderMap) -> Result<Uuid, AppError> {
    let header_val = headers
        .get("x-actor-id")
        .ok_or_else(|| AppError::Validation {
            message: "x-actor-id header is required".to_string(),
            field: Some("headers.x-actor-id".to_string()),
            received: None,
            docs_hint: Some(
                "Pass the authenticated user's id as a UUID in the x-actor-id header.".to_string(),
            ),
        })?;

    let actor_str = header_val.to_str().map_err(|_| AppError::Validation {
        message: "x-actor-id must be a valid UTF-8 string".to_string(),
        field: Some("headers.x-actor-id".to_string()),
        received: None,
        docs_hint: None,
    })?;

    Uuid::parse_str(actor_str).map_err(|_| AppError::Validation {
        message: "x-actor-id must be a valid UUID".to_string(),
        field: Some("headers.x-actor-id".to_string()),
        received: Some(serde_json::Value::String(actor_str.to_string())),
        docs_hint: Some(
            "Use a valid UUIDv4 or UUIDv7, e.g. 'a1b2c3d4-e5f6-7890-abcd-ef1234567890'"
                .to_string(),
        ),
    })
}

/// Try to extract a field name from serde's error messages.
fn extract_field_from_serde_message(msg: &str) -> Option<String> {
    // Pattern: "missing field `fieldname`"
    if let Some(start) = msg.find("missing field `") {
        let after = &msg[start + 15..];
        if let Some(end) = after.find('`') {
            return Some(after[..end].to_string());
        }
    }
    // Pattern: "unknown field `fieldname`"
    if let Some(start) = msg.find("unknown field `") {
        let after = &msg[start + 15..];
        if let Some(end) = after.find('`') {
            return Some(after[..end].to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extracts_field_from_missing_field_message() {
        assert_eq!(
            extract_field_from_serde_message("missing field `action_type` at line 1"),
            Some("action_type".to_string())
        );
        assert_eq!(
            extract_field_from_serde_message("unknown field `payloda`, expected one of"),
            Some("payloda".to_string())
        );
        assert_eq!(extract_field_from_serde_message("EOF while parsing"), None);
    }

    #[test]
    fn actor_header_must_be_a_uuid() {
        let mut headers = HeaderMap::new();
        assert!(extract_actor_id(&headers).is_err());

        headers.insert("x-actor-id", HeaderValue::from_static("not-a-uuid"));
        assert!(extract_actor_id(&headers).is_err());

        let id = Uuid::now_v7();
        headers.insert("x-actor-id", HeaderValue::from_str(&id.to_string()).unwrap());
        assert_eq!(extract_actor_id(&headers).unwrap(), id);
    }
}
