//! Shortcuts that map common fields onto a record for a fixed module

use serde::Deserialize;
use serde_json::Value as JsonValue;
use zohocrm_core::{CrmError, CrmResult, ModuleName, Record};

/// A typed set of well-known fields that turns into a generic record
pub trait RecordPreset {
    fn module(&self) -> ModuleName;

    fn into_record(self) -> CrmResult<Record>;
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadPreset {
    #[serde(default)]
    pub first_name: Option<String>,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub lead_source: Option<String>,
    #[serde(default)]
    pub additional_fields: Record,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactPreset {
    #[serde(default)]
    pub first_name: Option<String>,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub additional_fields: Record,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountPreset {
    pub account_name: String,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub additional_fields: Record,
}

/// Ordered field builder; optional values are skipped when absent
struct FieldMapper {
    record: Record,
    required: Vec<&'static str>,
}

fn missing_field(api_name: &str) -> CrmError {
    CrmError::ValidationFailed {
        message: format!("{} is required", api_name),
        fields: vec![zohocrm_core::FieldError {
            api_name: Some(api_name.to_string()),
            code: "MANDATORY_NOT_FOUND".to_string(),
            message: "required field not found".to_string(),
            details: None,
        }],
    }
}

fn is_blank(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

impl FieldMapper {
    fn new() -> Self {
        Self {
            record: Record::new(),
            required: Vec::new(),
        }
    }

    fn required(mut self, api_name: &'static str, value: String) -> CrmResult<Self> {
        if value.trim().is_empty() {
            return Err(missing_field(api_name));
        }
        self.record.insert(api_name.to_string(), JsonValue::String(value));
        self.required.push(api_name);
        Ok(self)
    }

    fn optional(mut self, api_name: &str, value: Option<String>) -> Self {
        if let Some(value) = value {
            self.record.insert(api_name.to_string(), JsonValue::String(value));
        }
        self
    }

    /// Extra fields go last and win over mapped ones, but may not blank
    /// out a required field
    fn extend(mut self, additional: Record) -> CrmResult<Record> {
        self.record.extend(additional);
        for api_name in &self.required {
            if self.record.get(*api_name).map_or(true, is_blank) {
                return Err(missing_field(api_name));
            }
        }
        Ok(self.record)
    }
}

impl RecordPreset for LeadPreset {
    fn module(&self) -> ModuleName {
        ModuleName::leads()
    }

    fn into_record(self) -> CrmResult<Record> {
        FieldMapper::new()
            .optional("First_Name", self.first_name)
            .required("Last_Name", self.last_name)?
            .optional("Email", self.email)
            .optional("Company", self.company)
            .optional("Phone", self.phone)
            .optional("Lead_Source", self.lead_source)
            .extend(self.additional_fields)
    }
}

impl RecordPreset for ContactPreset {
    fn module(&self) -> ModuleName {
        ModuleName::contacts()
    }

    fn into_record(self) -> CrmResult<Record> {
        FieldMapper::new()
            .optional("First_Name", self.first_name)
            .required("Last_Name", self.last_name)?
            .optional("Email", self.email)
            .optional("Account_Name", self.account_name)
            .optional("Phone", self.phone)
            .extend(self.additional_fields)
    }
}

impl RecordPreset for AccountPreset {
    fn module(&self) -> ModuleName {
        ModuleName::accounts()
    }

    fn into_record(self) -> CrmResult<Record> {
        FieldMapper::new()
            .required("Account_Name", self.account_name)?
            .optional("Website", self.website)
            .optional("Phone", self.phone)
            .optional("Industry", self.industry)
            .extend(self.additional_fields)
    }
}
