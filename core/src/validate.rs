//! Input sanitization and validation primitives shared by the pending
//! store (draft payloads) and the confirmation executor (final payloads).
//!
//! Everything the classifier produces is untrusted: free text is stripped
//! and capped before it ever reaches storage, references must parse as
//! UUIDs before any lookup is attempted, enums are checked against their
//! allow-lists, and dates must be real calendar dates.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use thiserror::Error;
use uuid::Uuid;

/// Maximum length of short text fields (task titles, programme names).
pub const TITLE_MAX_LEN: usize = 160;

/// Maximum length of free-form text fields (descriptions, notes).
pub const TEXT_MAX_LEN: usize = 2000;

static MARKUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid markup regex"));

/// Strict `YYYY-MM-DD` shape; calendar validity is checked separately.
static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date regex"));

/// Why a field failed validation. Carries the field name so callers can
/// build a structured error without re-deriving context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("{field} is required and must not be empty")]
    Missing { field: String },
    #[error("{field} must be a valid UUID reference")]
    BadReference { field: String, received: String },
    #[error("{field} must be one of: {allowed}")]
    BadEnum {
        field: String,
        received: String,
        allowed: String,
    },
    #[error("{field} must be a real calendar date in YYYY-MM-DD format")]
    BadDate { field: String, received: String },
}

impl FieldError {
    pub fn field(&self) -> &str {
        match self {
            Self::Missing { field }
            | Self::BadReference { field, .. }
            | Self::BadEnum { field, .. }
            | Self::BadDate { field, .. } => field,
        }
    }

    pub fn received(&self) -> Option<&str> {
        match self {
            Self::Missing { .. } => None,
            Self::BadReference { received, .. }
            | Self::BadEnum { received, .. }
            | Self::BadDate { received, .. } => Some(received),
        }
    }
}

/// Strip markup and control characters from free text, collapse the edges,
/// and truncate to `max_len` characters (not bytes — caps are user-facing).
pub fn sanitize_text(input: &str, max_len: usize) -> String {
    let stripped = MARKUP_RE.replace_all(input, "");
    let cleaned: String = stripped
        .chars()
        .filter(|c| !c.is_control() || *c == '\n')
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.chars().count() <= max_len {
        return trimmed.to_string();
    }
    trimmed.chars().take(max_len).collect()
}

/// A required short-text field: sanitized, capped at [`TITLE_MAX_LEN`],
/// must be non-empty after sanitization.
pub fn require_title(field: &str, value: Option<&str>) -> Result<String, FieldError> {
    let sanitized = sanitize_text(value.unwrap_or_default(), TITLE_MAX_LEN);
    if sanitized.is_empty() {
        return Err(FieldError::Missing {
            field: field.to_string(),
        });
    }
    Ok(sanitized)
}

/// An optional free-text field: sanitized and capped; empty becomes `None`.
pub fn optional_text(value: Option<&str>) -> Option<String> {
    let sanitized = sanitize_text(value?, TEXT_MAX_LEN);
    if sanitized.is_empty() { None } else { Some(sanitized) }
}

/// A required reference field. Malformed references are rejected before
/// any lookup — never passed through to storage unchecked.
pub fn require_reference(field: &str, value: Option<&str>) -> Result<Uuid, FieldError> {
    let raw = value.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(FieldError::Missing {
            field: field.to_string(),
        });
    }
    Uuid::parse_str(raw).map_err(|_| FieldError::BadReference {
        field: field.to_string(),
        received: raw.to_string(),
    })
}

/// A required enum field, validated case-normalized against `allowed` via
/// the supplied parser.
pub fn require_enum<T>(
    field: &str,
    value: Option<&str>,
    allowed: &[&str],
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, FieldError> {
    let raw = value.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(FieldError::Missing {
            field: field.to_string(),
        });
    }
    parse(raw).ok_or_else(|| FieldError::BadEnum {
        field: field.to_string(),
        received: raw.to_string(),
        allowed: allowed.join(", "),
    })
}

/// An optional date field. Must match `YYYY-MM-DD` and denote a real
/// calendar date (2025-02-30 fails even though it pattern-matches).
pub fn optional_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>, FieldError> {
    let raw = match value.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(raw) => raw,
    };
    if !DATE_RE.is_match(raw) {
        return Err(FieldError::BadDate {
            field: field.to_string(),
            received: raw.to_string(),
        });
    }
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Ok(Some(date)),
        Err(_) => Err(FieldError::BadDate {
            field: field.to_string(),
            received: raw.to_string(),
        }),
    }
}

/// A required date field.
pub fn require_date(field: &str, value: Option<&str>) -> Result<NaiveDate, FieldError> {
    optional_date(field, value)?.ok_or_else(|| FieldError::Missing {
        field: field.to_string(),
    })
}

/// Sanitize every string value in a draft payload in place. Applied when a
/// pending record is created or slot-filled, so stored drafts never carry
/// markup even before confirmation-time validation.
pub fn sanitize_payload(
    payload: &serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    payload
        .iter()
        .map(|(key, value)| {
            let cleaned = match value {
                serde_json::Value::String(text) => {
                    serde_json::Value::String(sanitize_text(text, TEXT_MAX_LEN))
                }
                other => other.clone(),
            };
            (key.clone(), cleaned)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_markup_and_control_chars() {
        assert_eq!(
            sanitize_text("<script>alert(1)</script>Ship the <b>report</b>", TITLE_MAX_LEN),
            "alert(1)Ship the report"
        );
        assert_eq!(
            sanitize_text("line\u{0000}break\u{0007} kept\n", TEXT_MAX_LEN),
            "linebreak kept"
        );
    }

    #[test]
    fn sanitize_truncates_by_characters() {
        let long = "x".repeat(TITLE_MAX_LEN + 50);
        assert_eq!(sanitize_text(&long, TITLE_MAX_LEN).chars().count(), TITLE_MAX_LEN);
    }

    #[test]
    fn title_required_after_sanitization() {
        assert!(require_title("title", Some("<i></i>  ")).is_err());
        assert_eq!(require_title("title", Some("  Write report ")).unwrap(), "Write report");
        assert!(matches!(
            require_title("title", None),
            Err(FieldError::Missing { .. })
        ));
    }

    #[test]
    fn references_must_be_uuids() {
        assert!(require_reference("task_id", Some("1 OR 1=1")).is_err());
        assert!(require_reference("task_id", Some("")).is_err());
        let id = Uuid::now_v7();
        assert_eq!(require_reference("task_id", Some(&id.to_string())).unwrap(), id);
    }

    #[test]
    fn enum_validation_reports_allow_list() {
        use crate::records::TaskStatus;
        let err = require_enum("new_status", Some("bogus"), TaskStatus::ALLOWED, TaskStatus::parse)
            .unwrap_err();
        match err {
            FieldError::BadEnum { allowed, .. } => assert!(allowed.contains("in_progress")),
            other => panic!("unexpected error: {other:?}"),
        }
        let parsed =
            require_enum("new_status", Some("DONE"), TaskStatus::ALLOWED, TaskStatus::parse)
                .unwrap();
        assert_eq!(parsed, TaskStatus::Done);
    }

    #[test]
    fn dates_must_be_real_calendar_dates() {
        assert!(optional_date("due_date", Some("2025-02-30")).is_err());
        assert!(optional_date("due_date", Some("30/02/2025")).is_err());
        assert_eq!(optional_date("due_date", Some("")).unwrap(), None);
        assert_eq!(
            optional_date("due_date", Some("2025-06-01")).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 1)
        );
    }

    #[test]
    fn payload_sanitization_touches_only_strings() {
        let mut payload = serde_json::Map::new();
        payload.insert("title".into(), serde_json::json!("<b>hey</b>"));
        payload.insert("count".into(), serde_json::json!(3));
        let cleaned = sanitize_payload(&payload);
        assert_eq!(cleaned["title"], serde_json::json!("hey"));
        assert_eq!(cleaned["count"], serde_json::json!(3));
    }
}
