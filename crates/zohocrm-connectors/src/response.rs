//! Normalization of CRM responses into a small set of outcomes
//!
//! The CRM reports failures in three places: the HTTP status, a top-level
//! `{code, message, details}` envelope, and per-row entries inside `data[]`
//! (writes answer 2xx even when a row is rejected).

use serde_json::Value as JsonValue;
use std::time::Duration;
use zohocrm_core::FieldError;

/// Error codes that describe a problem with the submitted fields
const VALIDATION_CODES: &[&str] = &[
    "MANDATORY_NOT_FOUND",
    "INVALID_DATA",
    "DUPLICATE_DATA",
    "LIMIT_EXCEEDED",
    "REQUIRED_PARAM_MISSING",
    "EXPECTED_FIELD_MISSING",
    "ID_ALREADY_CONVERTED",
    "MULTIPLE_OR_MULTI_ERRORS",
];

const AUTH_CODES: &[&str] = &["INVALID_TOKEN", "AUTHENTICATION_FAILURE"];

const QUERY_CODES: &[&str] = &["INVALID_QUERY", "INVALID_REQUEST"];

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome {
    /// 2xx with a JSON payload
    Success(JsonValue),
    /// 204, or a 2xx with an empty body
    NoContent,
    Validation {
        message: String,
        fields: Vec<FieldError>,
    },
    NotFound {
        message: String,
    },
    ModuleNotFound {
        message: String,
    },
    InvalidQuery {
        message: String,
    },
    RateLimited {
        retry_after: Option<Duration>,
    },
    AuthRejected {
        message: String,
    },
    Unexpected {
        status: u16,
        message: String,
    },
}

/// Map an HTTP exchange onto a [`RemoteOutcome`]
pub fn normalize(status: u16, retry_after: Option<Duration>, body: &str) -> RemoteOutcome {
    if status == 429 {
        return RemoteOutcome::RateLimited { retry_after };
    }

    let trimmed = body.trim();
    if status == 204 || ((200..300).contains(&status) && trimmed.is_empty()) {
        return RemoteOutcome::NoContent;
    }

    let json: JsonValue = match serde_json::from_str(trimmed) {
        Ok(json) => json,
        Err(_) if (200..300).contains(&status) => {
            return RemoteOutcome::Unexpected {
                status,
                message: format!("response is not JSON: {}", truncate(trimmed)),
            };
        }
        Err(_) if status == 401 => {
            return RemoteOutcome::AuthRejected {
                message: truncate(trimmed),
            };
        }
        Err(_) if status == 404 => {
            return RemoteOutcome::NotFound {
                message: truncate(trimmed),
            };
        }
        Err(_) => {
            return RemoteOutcome::Unexpected {
                status,
                message: if trimmed.is_empty() {
                    format!("HTTP {}", status)
                } else {
                    truncate(trimmed)
                },
            };
        }
    };

    if let Some(code) = json.get("code").and_then(|c| c.as_str()) {
        if json.get("status").and_then(|s| s.as_str()) == Some("error") || status >= 400 {
            return classify_error(status, code, &json, retry_after);
        }
    }

    if let Some(outcome) = row_errors(&json) {
        return outcome;
    }

    if (200..300).contains(&status) {
        return RemoteOutcome::Success(json);
    }

    match status {
        401 => RemoteOutcome::AuthRejected {
            message: message_of(&json, status),
        },
        404 => RemoteOutcome::NotFound {
            message: message_of(&json, status),
        },
        _ => RemoteOutcome::Unexpected {
            status,
            message: message_of(&json, status),
        },
    }
}

fn classify_error(
    status: u16,
    code: &str,
    envelope: &JsonValue,
    retry_after: Option<Duration>,
) -> RemoteOutcome {
    let message = message_of(envelope, status);
    if code == "TOO_MANY_REQUESTS" {
        return RemoteOutcome::RateLimited { retry_after };
    }
    if AUTH_CODES.contains(&code) || status == 401 {
        return RemoteOutcome::AuthRejected { message };
    }
    if code == "INVALID_MODULE" {
        return RemoteOutcome::ModuleNotFound { message };
    }
    if QUERY_CODES.contains(&code) {
        return RemoteOutcome::InvalidQuery { message };
    }
    if refers_to_record_id(code, envelope) || status == 404 {
        return RemoteOutcome::NotFound { message };
    }
    if VALIDATION_CODES.contains(&code) {
        return RemoteOutcome::Validation {
            message,
            fields: vec![field_error(envelope)],
        };
    }
    RemoteOutcome::Unexpected {
        status,
        message: format!("{}: {}", code, message),
    }
}

/// Inspect `data[]` rows for per-record failures
fn row_errors(json: &JsonValue) -> Option<RemoteOutcome> {
    let rows = json.get("data")?.as_array()?;
    let failed: Vec<&JsonValue> = rows
        .iter()
        .filter(|row| row.get("status").and_then(|s| s.as_str()) == Some("error"))
        .collect();
    let first = failed.first()?;

    let code = first.get("code").and_then(|c| c.as_str()).unwrap_or_default();
    let message = message_of(first, 200);

    if refers_to_record_id(code, first) {
        return Some(RemoteOutcome::NotFound { message });
    }
    if code == "TOO_MANY_REQUESTS" {
        return Some(RemoteOutcome::RateLimited { retry_after: None });
    }
    if AUTH_CODES.contains(&code) {
        return Some(RemoteOutcome::AuthRejected { message });
    }
    Some(RemoteOutcome::Validation {
        message,
        fields: failed.into_iter().map(field_error).collect(),
    })
}

/// `INVALID_DATA` aimed at the record id means the record does not exist
fn refers_to_record_id(code: &str, envelope: &JsonValue) -> bool {
    if code != "INVALID_DATA" {
        return false;
    }
    let Some(details) = envelope.get("details") else {
        return false;
    };
    match details.get("api_name").and_then(|n| n.as_str()) {
        Some(name) => name == "id",
        None => details.get("id").is_some(),
    }
}

fn field_error(envelope: &JsonValue) -> FieldError {
    let details = envelope.get("details").filter(|d| match d {
        JsonValue::Object(map) => !map.is_empty(),
        JsonValue::Null => false,
        _ => true,
    });
    FieldError {
        api_name: details
            .and_then(|d| d.get("api_name"))
            .and_then(|n| n.as_str())
            .map(str::to_string),
        code: envelope
            .get("code")
            .and_then(|c| c.as_str())
            .unwrap_or("UNKNOWN")
            .to_string(),
        message: envelope
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string(),
        details: details.cloned(),
    }
}

fn message_of(envelope: &JsonValue, status: u16) -> String {
    envelope
        .get("message")
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status))
}

fn truncate(text: &str) -> String {
    const LIMIT: usize = 500;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(LIMIT).collect();
        cut.push_str("...");
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: JsonValue) -> String {
        value.to_string()
    }

    #[test]
    fn test_success_and_no_content() {
        let payload = json!({"data": [{"id": "1"}], "info": {"more_records": false}});
        assert_eq!(
            normalize(200, None, &body(payload.clone())),
            RemoteOutcome::Success(payload)
        );
        assert_eq!(normalize(204, None, ""), RemoteOutcome::NoContent);
    }

    #[test]
    fn test_rate_limit() {
        let retry_after = Some(Duration::from_secs(2));
        assert_eq!(
            normalize(429, retry_after, ""),
            RemoteOutcome::RateLimited { retry_after }
        );
        let envelope = json!({"code": "TOO_MANY_REQUESTS", "details": {}, "message": "slow down", "status": "error"});
        assert!(matches!(
            normalize(400, None, &body(envelope)),
            RemoteOutcome::RateLimited { .. }
        ));
    }

    #[test]
    fn test_auth_rejected() {
        let envelope = json!({"code": "INVALID_TOKEN", "details": {}, "message": "invalid oauth token", "status": "error"});
        assert_eq!(
            normalize(401, None, &body(envelope)),
            RemoteOutcome::AuthRejected {
                message: "invalid oauth token".to_string()
            }
        );
        assert!(matches!(
            normalize(401, None, "unauthorized"),
            RemoteOutcome::AuthRejected { .. }
        ));
    }

    #[test]
    fn test_module_and_query_errors() {
        let envelope = json!({"code": "INVALID_MODULE", "details": {}, "message": "the module name given seems to be invalid", "status": "error"});
        assert!(matches!(
            normalize(400, None, &body(envelope)),
            RemoteOutcome::ModuleNotFound { .. }
        ));

        let envelope = json!({"code": "INVALID_QUERY", "details": {"reason": "invalid operator found", "api_name": "Email"}, "message": "invalid query formed", "status": "error"});
        assert_eq!(
            normalize(400, None, &body(envelope)),
            RemoteOutcome::InvalidQuery {
                message: "invalid query formed".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_id_is_not_found() {
        let envelope = json!({"code": "INVALID_DATA", "details": {"api_name": "id"}, "message": "the related id given seems to be invalid", "status": "error"});
        assert!(matches!(
            normalize(400, None, &body(envelope)),
            RemoteOutcome::NotFound { .. }
        ));

        let rows = json!({"data": [{"code": "INVALID_DATA", "details": {"id": "999"}, "message": "the related id given seems to be invalid", "status": "error"}]});
        assert!(matches!(
            normalize(200, None, &body(rows)),
            RemoteOutcome::NotFound { .. }
        ));
    }

    #[test]
    fn test_row_validation_errors() {
        let rows = json!({"data": [{
            "code": "MANDATORY_NOT_FOUND",
            "details": {"api_name": "Last_Name", "json_path": "$.data[0].Last_Name"},
            "message": "required field not found",
            "status": "error"
        }]});

        match normalize(202, None, &body(rows)) {
            RemoteOutcome::Validation { message, fields } => {
                assert_eq!(message, "required field not found");
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].api_name.as_deref(), Some("Last_Name"));
                assert_eq!(fields[0].code, "MANDATORY_NOT_FOUND");
            }
            other => panic!("expected validation, got {:?}", other),
        }
    }

    #[test]
    fn test_top_level_invalid_data_on_field() {
        let envelope = json!({"code": "INVALID_DATA", "details": {"api_name": "Email"}, "message": "invalid data", "status": "error"});
        match normalize(400, None, &body(envelope)) {
            RemoteOutcome::Validation { fields, .. } => {
                assert_eq!(fields[0].api_name.as_deref(), Some("Email"))
            }
            other => panic!("expected validation, got {:?}", other),
        }
    }

    #[test]
    fn test_unexpected() {
        assert_eq!(
            normalize(500, None, "<html>oops</html>"),
            RemoteOutcome::Unexpected {
                status: 500,
                message: "<html>oops</html>".to_string()
            }
        );
        let envelope = json!({"code": "INTERNAL_ERROR", "details": {}, "message": "internal error", "status": "error"});
        assert_eq!(
            normalize(500, None, &body(envelope)),
            RemoteOutcome::Unexpected {
                status: 500,
                message: "INTERNAL_ERROR: internal error".to_string()
            }
        );
        assert!(matches!(
            normalize(404, None, ""),
            RemoteOutcome::NotFound { .. }
        ));
    }
}
