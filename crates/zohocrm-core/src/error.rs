use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

pub type CrmResult<T> = Result<T, CrmError>;

/// Field-level detail reported by the CRM when it rejects a write or a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// API name of the offending field, when the CRM names one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_name: Option<String>,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

/// Every failure an operation can surface to its caller.
///
/// Messages carry the remote explanation when one exists. Tokens and the
/// broker secret are never part of any variant.
#[derive(Debug, Clone, Error)]
pub enum CrmError {
    #[error("authentication unavailable: {0}")]
    AuthUnavailable(String),

    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("credential expired beyond refresh: {0}")]
    CredentialExpiredBeyondRefresh(String),

    #[error("module not found: {0}")]
    ModuleNotFound(String),

    #[error("record not found: {module}/{id}")]
    RecordNotFound { module: String, id: String },

    #[error("invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("invalid search criterion: {0}")]
    InvalidCriterion(String),

    #[error("validation failed: {message}")]
    ValidationFailed {
        message: String,
        fields: Vec<FieldError>,
    },

    #[error("rate limited after {attempts} attempt(s)")]
    RateLimited { attempts: u32 },

    #[error("network timeout after {0}ms")]
    NetworkTimeout(u64),

    #[error("unexpected remote error ({status}): {message}")]
    UnexpectedRemoteError { status: u16, message: String },
}

impl CrmError {
    /// Taxonomy name of this error
    pub fn kind(&self) -> &'static str {
        match self {
            CrmError::AuthUnavailable(_) => "AuthUnavailable",
            CrmError::ConnectionNotFound(_) => "ConnectionNotFound",
            CrmError::CredentialExpiredBeyondRefresh(_) => "CredentialExpiredBeyondRefresh",
            CrmError::ModuleNotFound(_) => "ModuleNotFound",
            CrmError::RecordNotFound { .. } => "RecordNotFound",
            CrmError::InvalidPagination(_) => "InvalidPagination",
            CrmError::InvalidCriterion(_) => "InvalidCriterion",
            CrmError::ValidationFailed { .. } => "ValidationFailed",
            CrmError::RateLimited { .. } => "RateLimited",
            CrmError::NetworkTimeout(_) => "NetworkTimeout",
            CrmError::UnexpectedRemoteError { .. } => "UnexpectedRemoteError",
        }
    }

    /// Shorthand for a single-field validation failure raised locally
    pub fn validation(message: impl Into<String>) -> Self {
        CrmError::ValidationFailed {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn record_not_found(module: impl Into<String>, id: impl Into<String>) -> Self {
        CrmError::RecordNotFound {
            module: module.into(),
            id: id.into(),
        }
    }

    /// Tool-facing error object: `{"error": {"kind", "message", ...}}`
    pub fn to_json(&self) -> JsonValue {
        let mut body = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        match self {
            CrmError::ValidationFailed { fields, .. } if !fields.is_empty() => {
                body["fields"] = serde_json::to_value(fields).unwrap_or(JsonValue::Null);
            }
            CrmError::UnexpectedRemoteError { status, .. } => {
                body["status"] = json!(status);
            }
            CrmError::RateLimited { attempts } => {
                body["attempts"] = json!(attempts);
            }
            _ => {}
        }
        json!({ "error": body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_match_taxonomy() {
        assert_eq!(CrmError::AuthUnavailable("x".into()).kind(), "AuthUnavailable");
        assert_eq!(CrmError::record_not_found("Leads", "1").kind(), "RecordNotFound");
        assert_eq!(CrmError::NetworkTimeout(30_000).kind(), "NetworkTimeout");
        assert_eq!(CrmError::RateLimited { attempts: 4 }.kind(), "RateLimited");
    }

    #[test]
    fn test_validation_error_json_carries_fields() {
        let err = CrmError::ValidationFailed {
            message: "required field not found".to_string(),
            fields: vec![FieldError {
                api_name: Some("Last_Name".to_string()),
                code: "MANDATORY_NOT_FOUND".to_string(),
                message: "required field not found".to_string(),
                details: None,
            }],
        };

        let json = err.to_json();
        assert_eq!(json["error"]["kind"], "ValidationFailed");
        assert_eq!(json["error"]["fields"][0]["api_name"], "Last_Name");
        assert_eq!(json["error"]["fields"][0]["code"], "MANDATORY_NOT_FOUND");
    }

    #[test]
    fn test_unexpected_remote_error_json_carries_status() {
        let err = CrmError::UnexpectedRemoteError {
            status: 502,
            message: "bad gateway".to_string(),
        };
        let json = err.to_json();
        assert_eq!(json["error"]["status"], 502);
        assert!(json["error"]["message"].as_str().unwrap().contains("bad gateway"));
    }
}
