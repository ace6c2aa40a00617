use crate::error::{CrmError, CrmResult};
use crate::region::Region;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// A CRM record: field API name to value, in the order the fields were given.
pub type Record = IndexMap<String, JsonValue>;

/// Largest page the CRM serves in one request
pub const MAX_PER_PAGE: u32 = 200;
pub const DEFAULT_PER_PAGE: u32 = 20;

static MODULE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid module name pattern"));

/// API name of a CRM module (`Leads`, `Contacts`, `Deals`, custom modules).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleName(String);

impl ModuleName {
    pub fn new(name: impl Into<String>) -> CrmResult<Self> {
        let name = name.into();
        let trimmed = name.trim();
        if !MODULE_NAME_RE.is_match(trimmed) {
            return Err(CrmError::ModuleNotFound(format!(
                "'{}' is not a valid module API name",
                name
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn leads() -> Self {
        Self("Leads".to_string())
    }

    pub fn contacts() -> Self {
        Self("Contacts".to_string())
    }

    pub fn accounts() -> Self {
        Self("Accounts".to_string())
    }
}

impl TryFrom<String> for ModuleName {
    type Error = CrmError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ModuleName::new(value)
    }
}

impl From<ModuleName> for String {
    fn from(value: ModuleName) -> Self {
        value.0
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a record inside a module
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    /// Ids are used as a URL path segment, so separators and whitespace are rejected.
    pub fn new(module: &ModuleName, id: impl Into<String>) -> CrmResult<Self> {
        let id = id.into();
        let trimmed = id.trim();
        let malformed = trimmed.is_empty()
            || trimmed
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '%'));
        if malformed {
            return Err(CrmError::record_not_found(module.as_str(), id));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn parse(value: &str) -> CrmResult<Self> {
        match value.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(CrmError::InvalidPagination(format!(
                "sort_order must be 'asc' or 'desc', got '{}'",
                other
            ))),
        }
    }
}

/// Page selection for list and search operations
#[derive(Debug, Clone, PartialEq)]
pub struct Pagination {
    page: u32,
    per_page: u32,
    sort_by: Option<String>,
    sort_order: Option<SortOrder>,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            sort_by: None,
            sort_order: None,
        }
    }
}

impl Pagination {
    pub fn new(page: u32, per_page: u32) -> CrmResult<Self> {
        if page == 0 {
            return Err(CrmError::InvalidPagination(
                "page numbers start at 1".to_string(),
            ));
        }
        if per_page == 0 || per_page > MAX_PER_PAGE {
            return Err(CrmError::InvalidPagination(format!(
                "per_page must be between 1 and {}, got {}",
                MAX_PER_PAGE, per_page
            )));
        }
        Ok(Self {
            page,
            per_page,
            sort_by: None,
            sort_order: None,
        })
    }

    pub fn with_sort(mut self, sort_by: impl Into<String>, order: Option<SortOrder>) -> CrmResult<Self> {
        let sort_by = sort_by.into();
        if sort_by.trim().is_empty() {
            return Err(CrmError::InvalidPagination(
                "sort_by must name a field".to_string(),
            ));
        }
        self.sort_by = Some(sort_by.trim().to_string());
        self.sort_order = order;
        Ok(self)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn sort_by(&self) -> Option<&str> {
        self.sort_by.as_deref()
    }

    /// Query parameters understood by the list and search endpoints
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("page", self.page.to_string()),
            ("per_page", self.per_page.to_string()),
        ];
        if let Some(sort_by) = &self.sort_by {
            query.push(("sort_by", sort_by.clone()));
        }
        if let Some(order) = self.sort_order {
            query.push(("sort_order", order.as_str().to_string()));
        }
        query
    }
}

/// Paging hints returned alongside a page of records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub more_records: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPage {
    pub records: Vec<Record>,
    pub info: PageInfo,
}

impl RecordPage {
    pub fn empty(pagination: &Pagination) -> Self {
        Self {
            records: Vec::new(),
            info: PageInfo {
                page: Some(pagination.page()),
                per_page: Some(pagination.per_page()),
                count: Some(0),
                more_records: Some(false),
            },
        }
    }
}

/// Confirmation of a create or update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteConfirmation {
    pub id: String,
    /// Fields as they were sent
    pub fields: Record,
    /// Server-side details (timestamps, author) as returned
    #[serde(default)]
    pub details: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteConfirmation {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Identifies one authorized CRM account at the token broker
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionRef {
    pub connection_id: String,
    pub integration_id: String,
}

impl ConnectionRef {
    pub fn new(connection_id: impl Into<String>, integration_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            integration_id: integration_id.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.connection_id.trim().is_empty() && !self.integration_id.trim().is_empty()
    }
}

impl fmt::Display for ConnectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.connection_id, self.integration_id)
    }
}

/// Bearer token whose value never reaches `Debug`, `Display` or serialized output.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw token, for building the Authorization header only
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(***REDACTED***)")
    }
}

/// A usable token together with the region it is valid for
#[derive(Debug, Clone, PartialEq)]
pub struct AccessCredential {
    pub token: SecretToken,
    pub region: Region,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessCredential {
    pub fn new(token: SecretToken, region: Region, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token,
            region,
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }
}

/// Convert a JSON object into a record, preserving field order.
pub fn record_from_value(value: JsonValue) -> CrmResult<Record> {
    match value {
        JsonValue::Object(_) => serde_json::from_value(value).map_err(|e| {
            CrmError::validation(format!("record fields must be a JSON object: {}", e))
        }),
        other => Err(CrmError::validation(format!(
            "record fields must be a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

pub(crate) fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_module_name_validation() {
        assert_eq!(ModuleName::new("Leads").unwrap().as_str(), "Leads");
        assert_eq!(ModuleName::new(" Sales_Orders ").unwrap().as_str(), "Sales_Orders");
        assert!(matches!(ModuleName::new(""), Err(CrmError::ModuleNotFound(_))));
        assert!(matches!(ModuleName::new("Leads/1"), Err(CrmError::ModuleNotFound(_))));
        assert!(matches!(ModuleName::new("../org"), Err(CrmError::ModuleNotFound(_))));
    }

    #[test]
    fn test_record_id_rejects_path_tricks() {
        let module = ModuleName::leads();
        assert_eq!(RecordId::new(&module, "4150868000001").unwrap().as_str(), "4150868000001");
        for bad in ["", "  ", "1/2", "1?x=2", "a b", "%2F"] {
            assert!(
                matches!(RecordId::new(&module, bad), Err(CrmError::RecordNotFound { .. })),
                "id {:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_pagination_bounds() {
        assert!(Pagination::new(1, 200).is_ok());
        assert!(matches!(Pagination::new(0, 20), Err(CrmError::InvalidPagination(_))));
        assert!(matches!(Pagination::new(1, 0), Err(CrmError::InvalidPagination(_))));
        assert!(matches!(Pagination::new(1, 201), Err(CrmError::InvalidPagination(_))));
    }

    #[test]
    fn test_pagination_query_includes_sort() {
        let pagination = Pagination::new(2, 50)
            .unwrap()
            .with_sort("Created_Time", Some(SortOrder::Desc))
            .unwrap();
        assert_eq!(
            pagination.to_query(),
            vec![
                ("page", "2".to_string()),
                ("per_page", "50".to_string()),
                ("sort_by", "Created_Time".to_string()),
                ("sort_order", "desc".to_string()),
            ]
        );
    }

    #[test]
    fn test_secret_token_is_redacted() {
        let credential = AccessCredential::new(
            SecretToken::new("1000.abcdef.123456"),
            Region::Eu,
            None,
        );
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("abcdef"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_record_from_value_preserves_order() {
        let record = record_from_value(json!({"Last_Name": "Doe", "First_Name": "Jane", "Email": "j@x.io"}))
            .unwrap();
        let keys: Vec<&str> = record.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["Last_Name", "First_Name", "Email"]);

        assert!(matches!(
            record_from_value(json!(["not", "an", "object"])),
            Err(CrmError::ValidationFailed { .. })
        ));
    }
}
