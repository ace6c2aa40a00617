//! Tool catalog: names, descriptions and input schemas

use crate::mcp::{Tool, ToolAnnotations};
use serde_json::{json, Value};
use zohocrm_core::{DEFAULT_PER_PAGE, MAX_PER_PAGE};

pub const GET_CRM_RECORDS: &str = "get_crm_records";
pub const GET_CRM_RECORD: &str = "get_crm_record";
pub const CREATE_CRM_RECORD: &str = "create_crm_record";
pub const UPDATE_CRM_RECORD: &str = "update_crm_record";
pub const DELETE_CRM_RECORD: &str = "delete_crm_record";
pub const SEARCH_CRM_RECORDS: &str = "search_crm_records";
pub const SEARCH_CRM_BY_EMAIL: &str = "search_crm_by_email";
pub const SEARCH_CRM_BY_PHONE: &str = "search_crm_by_phone";
pub const CREATE_CRM_LEAD: &str = "create_crm_lead";
pub const CREATE_CRM_CONTACT: &str = "create_crm_contact";
pub const CREATE_CRM_ACCOUNT: &str = "create_crm_account";
pub const GET_CRM_MODULES: &str = "get_crm_modules";
pub const GET_CRM_FIELDS: &str = "get_crm_fields";
pub const GET_CRM_USERS: &str = "get_crm_users";
pub const GET_CRM_ORG: &str = "get_crm_org";

pub const TOOL_NAMES: &[&str] = &[
    GET_CRM_RECORDS,
    GET_CRM_RECORD,
    CREATE_CRM_RECORD,
    UPDATE_CRM_RECORD,
    DELETE_CRM_RECORD,
    SEARCH_CRM_RECORDS,
    SEARCH_CRM_BY_EMAIL,
    SEARCH_CRM_BY_PHONE,
    CREATE_CRM_LEAD,
    CREATE_CRM_CONTACT,
    CREATE_CRM_ACCOUNT,
    GET_CRM_MODULES,
    GET_CRM_FIELDS,
    GET_CRM_USERS,
    GET_CRM_ORG,
];

enum Effect {
    ReadOnly,
    Write,
    Destructive,
}

fn tool(name: &str, description: &str, effect: Effect, input_schema: Value) -> Tool {
    let annotations = match effect {
        Effect::ReadOnly => ToolAnnotations {
            read_only_hint: Some(true),
            destructive_hint: Some(false),
            idempotent_hint: Some(true),
        },
        Effect::Write => ToolAnnotations {
            read_only_hint: Some(false),
            destructive_hint: Some(false),
            idempotent_hint: Some(false),
        },
        Effect::Destructive => ToolAnnotations {
            read_only_hint: Some(false),
            destructive_hint: Some(true),
            idempotent_hint: Some(true),
        },
    };
    Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
        annotations: Some(annotations),
    }
}

fn module_property(description: &str) -> Value {
    json!({"type": "string", "description": description})
}

fn page_properties() -> (Value, Value) {
    (
        json!({"type": "integer", "description": "Page number for pagination", "default": 1, "minimum": 1}),
        json!({
            "type": "integer",
            "description": format!("Number of records per page (max {})", MAX_PER_PAGE),
            "default": DEFAULT_PER_PAGE,
            "minimum": 1,
            "maximum": MAX_PER_PAGE
        }),
    )
}

fn free_form(description: &str) -> Value {
    json!({"type": "object", "description": description, "additionalProperties": true})
}

/// Every tool the server knows, in a stable order
pub fn catalog() -> Vec<Tool> {
    let (page, per_page) = page_properties();
    vec![
        tool(
            GET_CRM_RECORDS,
            "Get records from a Zoho CRM module (Leads, Contacts, Accounts, etc.)",
            Effect::ReadOnly,
            json!({
                "type": "object",
                "properties": {
                    "module": module_property("CRM module name (e.g., Leads, Contacts, Accounts, Deals)"),
                    "page": page,
                    "per_page": per_page,
                    "sort_by": {"type": "string", "description": "Field to sort by"},
                    "sort_order": {"type": "string", "enum": ["asc", "desc"], "description": "Sort order"}
                },
                "required": ["module"]
            }),
        ),
        tool(
            GET_CRM_RECORD,
            "Get a specific record by ID from Zoho CRM",
            Effect::ReadOnly,
            json!({
                "type": "object",
                "properties": {
                    "module": module_property("CRM module name"),
                    "record_id": {"type": "string", "description": "Record ID"}
                },
                "required": ["module", "record_id"]
            }),
        ),
        tool(
            CREATE_CRM_RECORD,
            "Create a new record in Zoho CRM",
            Effect::Write,
            json!({
                "type": "object",
                "properties": {
                    "module": module_property("CRM module name"),
                    "data": free_form("Record data as key-value pairs")
                },
                "required": ["module", "data"]
            }),
        ),
        tool(
            UPDATE_CRM_RECORD,
            "Update an existing record in Zoho CRM",
            Effect::Write,
            json!({
                "type": "object",
                "properties": {
                    "module": module_property("CRM module name"),
                    "record_id": {"type": "string", "description": "Record ID to update"},
                    "data": free_form("Updated record data as key-value pairs")
                },
                "required": ["module", "record_id", "data"]
            }),
        ),
        tool(
            DELETE_CRM_RECORD,
            "Delete a record from Zoho CRM",
            Effect::Destructive,
            json!({
                "type": "object",
                "properties": {
                    "module": module_property("CRM module name"),
                    "record_id": {"type": "string", "description": "Record ID to delete"}
                },
                "required": ["module", "record_id"]
            }),
        ),
        tool(
            SEARCH_CRM_RECORDS,
            "Search records in Zoho CRM using criteria",
            Effect::ReadOnly,
            json!({
                "type": "object",
                "properties": {
                    "module": module_property("CRM module name"),
                    "criteria": {
                        "type": "string",
                        "description": "Search criteria (e.g., '(Email:equals:john@example.com)' or '((Last_Name:equals:Doe)and(Company:starts_with:Zyl))'). Either criteria or conditions is required."
                    },
                    "conditions": {
                        "type": "array",
                        "description": "Structured conditions, used instead of criteria",
                        "items": {
                            "type": "object",
                            "properties": {
                                "field": {"type": "string", "description": "Field API name"},
                                "comparator": {
                                    "type": "string",
                                    "enum": [
                                        "equals", "not_equal", "contains", "starts_with", "ends_with", "in",
                                        "greater_than", "greater_equal", "less_than", "less_equal", "between"
                                    ]
                                },
                                "value": {"description": "Single value"},
                                "values": {"type": "array", "description": "Values for 'in' and 'between'"}
                            },
                            "required": ["field", "comparator"]
                        }
                    },
                    "operator": {
                        "type": "string",
                        "enum": ["and", "or"],
                        "default": "and",
                        "description": "How conditions are combined"
                    },
                    "page": page,
                    "per_page": per_page
                },
                "required": ["module"]
            }),
        ),
        tool(
            SEARCH_CRM_BY_EMAIL,
            "Search CRM records by email address",
            Effect::ReadOnly,
            json!({
                "type": "object",
                "properties": {
                    "module": module_property("CRM module name (usually Contacts or Leads)"),
                    "email": {"type": "string", "description": "Email address to search for"},
                    "page": page,
                    "per_page": per_page
                },
                "required": ["module", "email"]
            }),
        ),
        tool(
            SEARCH_CRM_BY_PHONE,
            "Search CRM records by phone number",
            Effect::ReadOnly,
            json!({
                "type": "object",
                "properties": {
                    "module": module_property("CRM module name (usually Contacts or Leads)"),
                    "phone": {"type": "string", "description": "Phone number to search for"},
                    "page": page,
                    "per_page": per_page
                },
                "required": ["module", "phone"]
            }),
        ),
        tool(
            CREATE_CRM_LEAD,
            "Create a new lead in Zoho CRM with common fields",
            Effect::Write,
            json!({
                "type": "object",
                "properties": {
                    "first_name": {"type": "string", "description": "Lead's first name"},
                    "last_name": {"type": "string", "description": "Lead's last name"},
                    "email": {"type": "string", "description": "Lead's email address"},
                    "company": {"type": "string", "description": "Lead's company"},
                    "phone": {"type": "string", "description": "Lead's phone number"},
                    "lead_source": {"type": "string", "description": "Source of the lead"},
                    "additional_fields": free_form("Additional custom fields")
                },
                "required": ["first_name", "last_name"]
            }),
        ),
        tool(
            CREATE_CRM_CONTACT,
            "Create a new contact in Zoho CRM with common fields",
            Effect::Write,
            json!({
                "type": "object",
                "properties": {
                    "first_name": {"type": "string", "description": "Contact's first name"},
                    "last_name": {"type": "string", "description": "Contact's last name"},
                    "email": {"type": "string", "description": "Contact's email address"},
                    "account_name": {"type": "string", "description": "Associated account name"},
                    "phone": {"type": "string", "description": "Contact's phone number"},
                    "additional_fields": free_form("Additional custom fields")
                },
                "required": ["first_name", "last_name"]
            }),
        ),
        tool(
            CREATE_CRM_ACCOUNT,
            "Create a new account in Zoho CRM",
            Effect::Write,
            json!({
                "type": "object",
                "properties": {
                    "account_name": {"type": "string", "description": "Account name"},
                    "website": {"type": "string", "description": "Account website"},
                    "phone": {"type": "string", "description": "Account phone number"},
                    "industry": {"type": "string", "description": "Account industry"},
                    "additional_fields": free_form("Additional custom fields")
                },
                "required": ["account_name"]
            }),
        ),
        tool(
            GET_CRM_MODULES,
            "Get list of available CRM modules",
            Effect::ReadOnly,
            json!({"type": "object", "properties": {}}),
        ),
        tool(
            GET_CRM_FIELDS,
            "Get field metadata for a CRM module",
            Effect::ReadOnly,
            json!({
                "type": "object",
                "properties": {"module": module_property("CRM module name")},
                "required": ["module"]
            }),
        ),
        tool(
            GET_CRM_USERS,
            "Get list of CRM users",
            Effect::ReadOnly,
            json!({
                "type": "object",
                "properties": {
                    "type": {
                        "type": "string",
                        "description": "User filter (e.g., AllUsers, ActiveUsers, AdminUsers)"
                    }
                }
            }),
        ),
        tool(
            GET_CRM_ORG,
            "Get organization information",
            Effect::ReadOnly,
            json!({"type": "object", "properties": {}}),
        ),
    ]
}

pub fn find(name: &str) -> Option<Tool> {
    catalog().into_iter().find(|tool| tool.name == name)
}

/// Argument names listed under `required` in the tool's input schema
pub fn required_arguments(tool: &Tool) -> Vec<&str> {
    tool.input_schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|names| names.iter().filter_map(|n| n.as_str()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_is_complete_and_unique() {
        let tools = catalog();
        assert_eq!(tools.len(), 15);
        let names: HashSet<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names.len(), 15);
        for name in TOOL_NAMES {
            assert!(names.contains(name), "missing {}", name);
        }
        for tool in &tools {
            assert_eq!(tool.input_schema["type"], json!("object"));
        }
    }

    #[test]
    fn test_required_arguments() {
        let lead = find(CREATE_CRM_LEAD).unwrap();
        assert_eq!(required_arguments(&lead), vec!["first_name", "last_name"]);
        let org = find(GET_CRM_ORG).unwrap();
        assert!(required_arguments(&org).is_empty());
        assert!(find("drop_database").is_none());
    }

    #[test]
    fn test_per_page_limit_advertised() {
        let list = find(GET_CRM_RECORDS).unwrap();
        assert_eq!(
            list.input_schema["properties"]["per_page"]["maximum"],
            json!(200)
        );
        assert_eq!(
            list.input_schema["properties"]["sort_order"]["enum"],
            json!(["asc", "desc"])
        );
    }

    #[test]
    fn test_delete_is_marked_destructive() {
        let delete = find(DELETE_CRM_RECORD).unwrap();
        assert_eq!(delete.annotations.unwrap().destructive_hint, Some(true));
    }
}
