//! Utilities for keeping secrets out of logs and error messages

use serde_json::{Map, Value as JsonValue};

/// Fields that should be masked wherever a JSON payload is logged
const SENSITIVE_FIELDS: &[&str] = &[
    "access_token",
    "refresh_token",
    "token",
    "secret",
    "secret_key",
    "client_secret",
    "authorization",
    "password",
    "api_key",
    "credentials",
];

/// Substrings that mark a field as sensitive (case-insensitive)
const SENSITIVE_PATTERNS: &[&str] = &["_token", "_secret", "_password", "oauthtoken"];

const SANITIZED_PLACEHOLDER: &str = "***REDACTED***";

/// Check if a field name indicates sensitive data
pub fn is_sensitive_field(field_name: &str) -> bool {
    let field_lower = field_name.to_lowercase();

    if SENSITIVE_FIELDS.iter().any(|&sensitive| field_lower == sensitive) {
        return true;
    }

    SENSITIVE_PATTERNS.iter().any(|&pattern| field_lower.contains(pattern))
}

/// Replace the values of sensitive fields, recursing into objects and arrays
pub fn sanitize_json_value(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let sanitized: Map<String, JsonValue> = map
                .iter()
                .map(|(key, val)| {
                    let sanitized_val = if is_sensitive_field(key) {
                        match val {
                            JsonValue::Object(_) | JsonValue::Array(_) => sanitize_json_value(val),
                            JsonValue::Null => JsonValue::Null,
                            _ => JsonValue::String(SANITIZED_PLACEHOLDER.to_string()),
                        }
                    } else {
                        sanitize_json_value(val)
                    };
                    (key.clone(), sanitized_val)
                })
                .collect();
            JsonValue::Object(sanitized)
        }
        JsonValue::Array(arr) => JsonValue::Array(arr.iter().map(sanitize_json_value).collect()),
        other => other.clone(),
    }
}

/// Scrub known secret strings out of a free-form message (e.g. a remote error
/// body that echoes a header back).
pub fn redact_secrets(message: &str, secrets: &[&str]) -> String {
    secrets
        .iter()
        .filter(|secret| !secret.is_empty())
        .fold(message.to_string(), |acc, secret| {
            acc.replace(secret, SANITIZED_PLACEHOLDER)
        })
}

/// Create a sanitized display string for debug logging
pub fn create_debug_string(prefix: &str, json: &JsonValue) -> String {
    format!("{}: {}", prefix, sanitize_json_value(json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_sensitive_field() {
        assert!(is_sensitive_field("access_token"));
        assert!(is_sensitive_field("Secret_Key"));
        assert!(is_sensitive_field("zoho_oauthtoken"));
        assert!(is_sensitive_field("nango_secret"));

        assert!(!is_sensitive_field("Email"));
        assert!(!is_sensitive_field("Last_Name"));
        assert!(!is_sensitive_field("module"));
    }

    #[test]
    fn test_sanitize_nested_payload() {
        let input = json!({
            "module": "Leads",
            "credentials": {"access_token": "1000.abc", "expires_at": "2030-01-01T00:00:00Z"},
            "data": [{"Email": "jane@example.com", "api_key": "xyz"}]
        });

        let sanitized = sanitize_json_value(&input);
        assert_eq!(sanitized["module"], "Leads");
        assert_eq!(sanitized["credentials"]["access_token"], SANITIZED_PLACEHOLDER);
        assert_eq!(sanitized["data"][0]["Email"], "jane@example.com");
        assert_eq!(sanitized["data"][0]["api_key"], SANITIZED_PLACEHOLDER);
    }

    #[test]
    fn test_redact_secrets() {
        let message = "broker rejected header Bearer sk-live-123";
        assert_eq!(
            redact_secrets(message, &["sk-live-123", ""]),
            "broker rejected header Bearer ***REDACTED***"
        );
    }
}
