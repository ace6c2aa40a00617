//! Tool argument parsing and execution against the CRM adapter
//!
//! Parsing only checks the shape of the arguments; anything the CRM domain
//! rejects (bad module names, page sizes, criteria) surfaces as a tool
//! error result, not as a protocol error.

use crate::error::{McpError, McpResult};
use crate::tools::{self, *};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use zohocrm_connectors::{AccountPreset, ContactPreset, CrmClient, LeadPreset};
use zohocrm_core::{
    BoolOp, Comparator, Criterion, CrmError, CrmResult, ModuleName, Pagination, Record, RecordId,
    SortOrder,
};

#[derive(Debug, Clone, Deserialize)]
pub struct PageArgs {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
}

impl PageArgs {
    fn pagination(&self) -> CrmResult<Pagination> {
        let defaults = Pagination::default();
        Pagination::new(
            self.page.unwrap_or(defaults.page()),
            self.per_page.unwrap_or(defaults.per_page()),
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListArgs {
    pub module: String,
    #[serde(flatten)]
    pub paging: PageArgs,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_order: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordArgs {
    pub module: String,
    pub record_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateArgs {
    pub module: String,
    pub data: Record,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateArgs {
    pub module: String,
    pub record_id: String,
    pub data: Record,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConditionArgs {
    pub field: String,
    pub comparator: String,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchArgs {
    pub module: String,
    #[serde(default)]
    pub criteria: Option<String>,
    #[serde(default)]
    pub conditions: Option<Vec<ConditionArgs>>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(flatten)]
    pub paging: PageArgs,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailArgs {
    pub module: String,
    pub email: String,
    #[serde(flatten)]
    pub paging: PageArgs,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhoneArgs {
    pub module: String,
    pub phone: String,
    #[serde(flatten)]
    pub paging: PageArgs,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleArgs {
    pub module: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsersArgs {
    #[serde(default, rename = "type")]
    pub user_type: Option<String>,
}

/// A parsed `tools/call`
#[derive(Debug, Clone)]
pub enum ToolCall {
    ListRecords(ListArgs),
    GetRecord(RecordArgs),
    CreateRecord(CreateArgs),
    UpdateRecord(UpdateArgs),
    DeleteRecord(RecordArgs),
    Search(SearchArgs),
    SearchByEmail(EmailArgs),
    SearchByPhone(PhoneArgs),
    CreateLead(LeadPreset),
    CreateContact(ContactPreset),
    CreateAccount(AccountPreset),
    Modules,
    Fields(ModuleArgs),
    Users(UsersArgs),
    Org,
}

impl ToolCall {
    pub fn parse(name: &str, arguments: Option<Value>) -> McpResult<Self> {
        let tool = tools::find(name)
            .ok_or_else(|| McpError::ToolNotFound(format!("Unknown tool '{}'", name)))?;

        let arguments = match arguments {
            None | Some(Value::Null) => json!({}),
            Some(value @ Value::Object(_)) => value,
            Some(_) => {
                return Err(McpError::InvalidArguments(
                    "arguments must be an object".to_string(),
                ))
            }
        };
        for required in tools::required_arguments(&tool) {
            if arguments.get(required).map_or(true, Value::is_null) {
                return Err(McpError::InvalidArguments(format!(
                    "missing required argument '{}' for {}",
                    required, name
                )));
            }
        }

        let call = match name {
            GET_CRM_RECORDS => ToolCall::ListRecords(args(name, arguments)?),
            GET_CRM_RECORD => ToolCall::GetRecord(args(name, arguments)?),
            CREATE_CRM_RECORD => ToolCall::CreateRecord(args(name, arguments)?),
            UPDATE_CRM_RECORD => ToolCall::UpdateRecord(args(name, arguments)?),
            DELETE_CRM_RECORD => ToolCall::DeleteRecord(args(name, arguments)?),
            SEARCH_CRM_RECORDS => {
                let search: SearchArgs = args(name, arguments)?;
                match (&search.criteria, &search.conditions) {
                    (Some(_), Some(_)) => {
                        return Err(McpError::InvalidArguments(
                            "pass either 'criteria' or 'conditions', not both".to_string(),
                        ))
                    }
                    (None, None) => {
                        return Err(McpError::InvalidArguments(
                            "one of 'criteria' or 'conditions' is required".to_string(),
                        ))
                    }
                    _ => ToolCall::Search(search),
                }
            }
            SEARCH_CRM_BY_EMAIL => ToolCall::SearchByEmail(args(name, arguments)?),
            SEARCH_CRM_BY_PHONE => ToolCall::SearchByPhone(args(name, arguments)?),
            CREATE_CRM_LEAD => ToolCall::CreateLead(args(name, arguments)?),
            CREATE_CRM_CONTACT => ToolCall::CreateContact(args(name, arguments)?),
            CREATE_CRM_ACCOUNT => ToolCall::CreateAccount(args(name, arguments)?),
            GET_CRM_MODULES => ToolCall::Modules,
            GET_CRM_FIELDS => ToolCall::Fields(args(name, arguments)?),
            GET_CRM_USERS => ToolCall::Users(args(name, arguments)?),
            GET_CRM_ORG => ToolCall::Org,
            other => return Err(McpError::ToolNotFound(format!("Unknown tool '{}'", other))),
        };
        Ok(call)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::ListRecords(_) => GET_CRM_RECORDS,
            ToolCall::GetRecord(_) => GET_CRM_RECORD,
            ToolCall::CreateRecord(_) => CREATE_CRM_RECORD,
            ToolCall::UpdateRecord(_) => UPDATE_CRM_RECORD,
            ToolCall::DeleteRecord(_) => DELETE_CRM_RECORD,
            ToolCall::Search(_) => SEARCH_CRM_RECORDS,
            ToolCall::SearchByEmail(_) => SEARCH_CRM_BY_EMAIL,
            ToolCall::SearchByPhone(_) => SEARCH_CRM_BY_PHONE,
            ToolCall::CreateLead(_) => CREATE_CRM_LEAD,
            ToolCall::CreateContact(_) => CREATE_CRM_CONTACT,
            ToolCall::CreateAccount(_) => CREATE_CRM_ACCOUNT,
            ToolCall::Modules => GET_CRM_MODULES,
            ToolCall::Fields(_) => GET_CRM_FIELDS,
            ToolCall::Users(_) => GET_CRM_USERS,
            ToolCall::Org => GET_CRM_ORG,
        }
    }

    /// Run the call; the JSON value is what the tool result carries
    pub async fn execute(self, client: &CrmClient) -> CrmResult<Value> {
        match self {
            ToolCall::ListRecords(args) => {
                let module = ModuleName::new(args.module)?;
                let mut pagination = args.paging.pagination()?;
                match (args.sort_by, args.sort_order) {
                    (Some(sort_by), order) => {
                        let order = order.as_deref().map(SortOrder::parse).transpose()?;
                        pagination = pagination.with_sort(sort_by, order)?;
                    }
                    (None, Some(_)) => {
                        return Err(CrmError::InvalidPagination(
                            "sort_order requires sort_by".to_string(),
                        ))
                    }
                    (None, None) => {}
                }
                encode(client.list_records(&module, &pagination).await?)
            }
            ToolCall::GetRecord(args) => {
                let module = ModuleName::new(args.module)?;
                let id = RecordId::new(&module, args.record_id)?;
                encode(client.get_record(&module, &id).await?)
            }
            ToolCall::CreateRecord(args) => {
                let module = ModuleName::new(args.module)?;
                encode(client.create_record(&module, args.data).await?)
            }
            ToolCall::UpdateRecord(args) => {
                let module = ModuleName::new(args.module)?;
                let id = RecordId::new(&module, args.record_id)?;
                encode(client.update_record(&module, &id, args.data).await?)
            }
            ToolCall::DeleteRecord(args) => {
                let module = ModuleName::new(args.module)?;
                let id = RecordId::new(&module, args.record_id)?;
                encode(client.delete_record(&module, &id).await?)
            }
            ToolCall::Search(args) => {
                let module = ModuleName::new(args.module.clone())?;
                let pagination = args.paging.pagination()?;
                let criterion = build_criterion(&args)?;
                encode(client.search_records(&module, &criterion, &pagination).await?)
            }
            ToolCall::SearchByEmail(args) => {
                let module = ModuleName::new(args.module)?;
                let pagination = args.paging.pagination()?;
                encode(client.search_by_email(&module, &args.email, &pagination).await?)
            }
            ToolCall::SearchByPhone(args) => {
                let module = ModuleName::new(args.module)?;
                let pagination = args.paging.pagination()?;
                encode(client.search_by_phone(&module, &args.phone, &pagination).await?)
            }
            ToolCall::CreateLead(preset) => encode(client.create_from_preset(preset).await?),
            ToolCall::CreateContact(preset) => encode(client.create_from_preset(preset).await?),
            ToolCall::CreateAccount(preset) => encode(client.create_from_preset(preset).await?),
            ToolCall::Modules => Ok(json!({ "modules": client.list_modules().await? })),
            ToolCall::Fields(args) => {
                let module = ModuleName::new(args.module)?;
                Ok(json!({ "fields": client.get_fields(&module).await? }))
            }
            ToolCall::Users(args) => {
                Ok(json!({ "users": client.list_users(args.user_type.as_deref()).await? }))
            }
            ToolCall::Org => client.get_org().await,
        }
    }
}

fn args<T: DeserializeOwned>(tool: &str, arguments: Value) -> McpResult<T> {
    serde_json::from_value(arguments)
        .map_err(|e| McpError::InvalidArguments(format!("{}: {}", tool, e)))
}

fn encode<T: Serialize>(value: T) -> CrmResult<Value> {
    serde_json::to_value(value).map_err(|e| CrmError::UnexpectedRemoteError {
        status: 0,
        message: format!("failed to encode result: {}", e),
    })
}

/// Criterion from either the textual `criteria` or structured `conditions`
fn build_criterion(args: &SearchArgs) -> CrmResult<Criterion> {
    if let Some(expression) = &args.criteria {
        return Criterion::parse(expression);
    }

    let conditions = args.conditions.as_deref().unwrap_or_default();
    let terms = conditions
        .iter()
        .map(condition_from_args)
        .collect::<CrmResult<Vec<_>>>()?;
    let op = match args.operator.as_deref() {
        Some(op) => op.parse::<BoolOp>()?,
        None => BoolOp::And,
    };
    match op {
        BoolOp::And => Criterion::all(terms),
        BoolOp::Or => Criterion::any(terms),
    }
}

fn condition_from_args(condition: &ConditionArgs) -> CrmResult<Criterion> {
    let comparator: Comparator = condition.comparator.parse()?;
    let raw: Vec<&Value> = match (&condition.value, &condition.values) {
        (Some(value), None) => vec![value],
        (None, Some(values)) => values.iter().collect(),
        (Some(_), Some(_)) => {
            return Err(CrmError::InvalidCriterion(format!(
                "condition on '{}' has both 'value' and 'values'",
                condition.field
            )))
        }
        (None, None) => {
            return Err(CrmError::InvalidCriterion(format!(
                "condition on '{}' has no value",
                condition.field
            )))
        }
    };
    let values = raw
        .into_iter()
        .map(|value| scalar_text(&condition.field, value))
        .collect::<CrmResult<Vec<_>>>()?;
    Criterion::condition(condition.field.as_str(), comparator, values)
}

fn scalar_text(field: &str, value: &Value) -> CrmResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(CrmError::InvalidCriterion(format!(
            "value for '{}' must be a string, number or boolean",
            field
        ))),
    }
}
