//! CRM operation adapter
//!
//! Every operation resolves a credential, issues one authenticated request
//! against the region's API base and normalizes the answer. Rate limits are
//! retried with backoff; an auth rejection invalidates the credential and is
//! retried exactly once.

use crate::broker::BrokerClient;
use crate::credential_cache::{CredentialCache, CredentialProvider};
use crate::endpoint::CrmEndpoint;
use crate::error::ConnectorResult;
use crate::http::{build_client, parse_retry_after, RetryDecision, RetryManager, TimeoutManager};
use crate::presets::RecordPreset;
use crate::response::{normalize, RemoteOutcome};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Method};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use zohocrm_config::AppConfig;
use zohocrm_core::{
    create_debug_string, AccessCredential, ConnectionRef, Criterion, CrmError, CrmResult,
    DeleteConfirmation, ModuleName, PageInfo, Pagination, Record, RecordId, RecordPage,
    WriteConfirmation,
};

static USER_TYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]+$").expect("valid user type pattern"));

/// One outbound call, independent of the credential used to send it
#[derive(Debug, Clone)]
struct CrmRequest {
    method: Method,
    segments: Vec<String>,
    query: Vec<(String, String)>,
    body: Option<JsonValue>,
}

impl CrmRequest {
    fn new(method: Method, segments: &[&str]) -> Self {
        Self {
            method,
            segments: segments.iter().map(|s| s.to_string()).collect(),
            query: Vec::new(),
            body: None,
        }
    }

    fn query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    fn paginate(mut self, pagination: &Pagination) -> Self {
        self.query.extend(
            pagination
                .to_query()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v)),
        );
        self
    }

    fn body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    fn describe(&self) -> String {
        format!("{} /{}", self.method, self.segments.join("/"))
    }
}

struct Inner {
    http: Client,
    provider: Arc<dyn CredentialProvider>,
    connection: ConnectionRef,
    endpoint: CrmEndpoint,
    timeouts: TimeoutManager,
    retry: RetryManager,
}

/// Cheap to clone; clones share the HTTP client and credential cache
#[derive(Clone)]
pub struct CrmClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CrmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmClient")
            .field("connection", &self.inner.connection)
            .field("endpoint", &self.inner.endpoint)
            .finish_non_exhaustive()
    }
}

impl CrmClient {
    pub fn new(
        http: Client,
        provider: Arc<dyn CredentialProvider>,
        connection: ConnectionRef,
        endpoint: CrmEndpoint,
        timeouts: TimeoutManager,
        retry: RetryManager,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                provider,
                connection,
                endpoint,
                timeouts,
                retry,
            }),
        }
    }

    /// Wire the broker client, credential cache and CRM adapter from configuration
    pub fn from_config(config: &AppConfig) -> ConnectorResult<Self> {
        let timeouts = TimeoutManager::new(config.crm.connect_timeout(), config.crm.timeout());
        let http = build_client(&timeouts)?;
        let broker = BrokerClient::new(
            http.clone(),
            config.broker.base_url.clone(),
            zohocrm_core::SecretToken::new(config.broker.secret_key.clone()),
            timeouts.clone(),
        );
        let cache = CredentialCache::new(Arc::new(broker), config.crm.credential_ttl());
        Ok(Self::new(
            http,
            Arc::new(cache),
            config.broker.connection(),
            CrmEndpoint::new(config.crm.api_base_template.clone())?,
            timeouts,
            RetryManager::from_settings(&config.crm.retry),
        ))
    }

    pub fn connection(&self) -> &ConnectionRef {
        &self.inner.connection
    }

    /// Resolve a credential without calling the CRM
    pub async fn credential(&self) -> CrmResult<AccessCredential> {
        self.inner.provider.resolve(&self.inner.connection).await
    }

    pub async fn list_records(
        &self,
        module: &ModuleName,
        pagination: &Pagination,
    ) -> CrmResult<RecordPage> {
        let request = CrmRequest::new(Method::GET, &[module.as_str()]).paginate(pagination);
        match self.execute(&request).await? {
            RemoteOutcome::Success(body) => record_page(body, pagination),
            RemoteOutcome::NoContent => Ok(RecordPage::empty(pagination)),
            other => Err(module_error(other, module)),
        }
    }

    pub async fn get_record(&self, module: &ModuleName, id: &RecordId) -> CrmResult<Record> {
        let request = CrmRequest::new(Method::GET, &[module.as_str(), id.as_str()]);
        match self.execute(&request).await? {
            RemoteOutcome::Success(body) => first_row(&body)
                .ok_or_else(|| CrmError::record_not_found(module.as_str(), id.as_str()))
                .and_then(|row| zohocrm_core::record_from_value(row.clone())),
            other => Err(record_error(other, module, id)),
        }
    }

    pub async fn create_record(
        &self,
        module: &ModuleName,
        fields: Record,
    ) -> CrmResult<WriteConfirmation> {
        if fields.is_empty() {
            return Err(CrmError::validation("record fields must not be empty"));
        }
        let request =
            CrmRequest::new(Method::POST, &[module.as_str()]).body(json!({ "data": [&fields] }));
        debug!("{}", create_debug_string("Create payload", &json!(&fields)));
        match self.execute(&request).await? {
            RemoteOutcome::Success(body) => write_confirmation(&body, fields, None),
            other => Err(module_error(other, module)),
        }
    }

    pub async fn update_record(
        &self,
        module: &ModuleName,
        id: &RecordId,
        fields: Record,
    ) -> CrmResult<WriteConfirmation> {
        if fields.is_empty() {
            return Err(CrmError::validation("update fields must not be empty"));
        }
        let request = CrmRequest::new(Method::PUT, &[module.as_str(), id.as_str()])
            .body(json!({ "data": [&fields] }));
        debug!("{}", create_debug_string("Update payload", &json!(&fields)));
        match self.execute(&request).await? {
            RemoteOutcome::Success(body) => write_confirmation(&body, fields, Some(id)),
            other => Err(record_error(other, module, id)),
        }
    }

    pub async fn delete_record(
        &self,
        module: &ModuleName,
        id: &RecordId,
    ) -> CrmResult<DeleteConfirmation> {
        let request = CrmRequest::new(Method::DELETE, &[module.as_str(), id.as_str()]);
        match self.execute(&request).await? {
            RemoteOutcome::Success(body) => {
                let row = first_row(&body);
                Ok(DeleteConfirmation {
                    id: row
                        .and_then(|r| r.pointer("/details/id"))
                        .and_then(|v| v.as_str())
                        .unwrap_or(id.as_str())
                        .to_string(),
                    message: row
                        .and_then(|r| r.get("message"))
                        .and_then(|m| m.as_str())
                        .map(str::to_string),
                })
            }
            other => Err(record_error(other, module, id)),
        }
    }

    pub async fn search_records(
        &self,
        module: &ModuleName,
        criterion: &Criterion,
        pagination: &Pagination,
    ) -> CrmResult<RecordPage> {
        criterion.validate()?;
        let request = CrmRequest::new(Method::GET, &[module.as_str(), "search"])
            .query("criteria", criterion.to_expression())
            .paginate(pagination);
        match self.execute(&request).await? {
            RemoteOutcome::Success(body) => record_page(body, pagination),
            RemoteOutcome::NoContent => Ok(RecordPage::empty(pagination)),
            RemoteOutcome::InvalidQuery { message } => Err(CrmError::InvalidCriterion(message)),
            RemoteOutcome::Validation { message, .. } => Err(CrmError::InvalidCriterion(message)),
            other => Err(module_error(other, module)),
        }
    }

    pub async fn search_by_email(
        &self,
        module: &ModuleName,
        email: &str,
        pagination: &Pagination,
    ) -> CrmResult<RecordPage> {
        let criterion = Criterion::equals("Email", email)?;
        self.search_records(module, &criterion, pagination).await
    }

    pub async fn search_by_phone(
        &self,
        module: &ModuleName,
        phone: &str,
        pagination: &Pagination,
    ) -> CrmResult<RecordPage> {
        let criterion = Criterion::equals("Phone", phone)?;
        self.search_records(module, &criterion, pagination).await
    }

    /// Create a record from one of the typed presets
    pub async fn create_from_preset<P: RecordPreset>(&self, preset: P) -> CrmResult<WriteConfirmation> {
        let module = preset.module();
        let record = preset.into_record()?;
        self.create_record(&module, record).await
    }

    /// Modules visible to the connected user (`settings/modules`)
    pub async fn list_modules(&self) -> CrmResult<Vec<JsonValue>> {
        let request = CrmRequest::new(Method::GET, &["settings", "modules"]);
        let body = self.fetch_metadata(&request).await?;
        Ok(array_at(&body, "modules"))
    }

    /// Field metadata of `module` (`settings/fields?module=`)
    pub async fn get_fields(&self, module: &ModuleName) -> CrmResult<Vec<JsonValue>> {
        let request = CrmRequest::new(Method::GET, &["settings", "fields"])
            .query("module", module.as_str());
        match self.execute(&request).await? {
            RemoteOutcome::Success(body) => Ok(array_at(&body, "fields")),
            RemoteOutcome::NoContent => Ok(Vec::new()),
            other => Err(module_error(other, module)),
        }
    }

    /// CRM users, optionally filtered by type (`AllUsers`, `ActiveUsers`, ...)
    pub async fn list_users(&self, user_type: Option<&str>) -> CrmResult<Vec<JsonValue>> {
        let mut request = CrmRequest::new(Method::GET, &["users"]);
        if let Some(user_type) = user_type {
            if !USER_TYPE_RE.is_match(user_type) {
                return Err(CrmError::validation(format!(
                    "invalid user type '{}'",
                    user_type
                )));
            }
            request = request.query("type", user_type);
        }
        let body = self.fetch_metadata(&request).await?;
        Ok(array_at(&body, "users"))
    }

    /// Organization details (`org`)
    pub async fn get_org(&self) -> CrmResult<JsonValue> {
        let request = CrmRequest::new(Method::GET, &["org"]);
        let body = self.fetch_metadata(&request).await?;
        Ok(body
            .get("org")
            .and_then(|org| org.as_array())
            .and_then(|orgs| orgs.first())
            .cloned()
            .unwrap_or(body))
    }

    async fn fetch_metadata(&self, request: &CrmRequest) -> CrmResult<JsonValue> {
        match self.execute(request).await? {
            RemoteOutcome::Success(body) => Ok(body),
            RemoteOutcome::NoContent => Ok(json!({})),
            other => Err(generic_error(other)),
        }
    }

    /// Send `request`, absorbing rate limits and one auth rejection
    async fn execute(&self, request: &CrmRequest) -> CrmResult<RemoteOutcome> {
        let inner = &self.inner;
        let mut credential = inner.provider.resolve(&inner.connection).await?;
        let mut auth_retried = false;
        let mut rate_limit_retries = 0u32;
        let start = Instant::now();

        loop {
            let outcome = self.send(request, &credential).await?;
            match outcome {
                RemoteOutcome::AuthRejected { message } => {
                    if auth_retried {
                        return Err(CrmError::AuthUnavailable(format!(
                            "CRM rejected a freshly resolved credential: {}",
                            message
                        )));
                    }
                    warn!(
                        request = %request.describe(),
                        "CRM rejected credential, refreshing once"
                    );
                    inner.provider.invalidate(&inner.connection, &credential).await;
                    credential = inner.provider.resolve(&inner.connection).await?;
                    auth_retried = true;
                }
                RemoteOutcome::RateLimited { retry_after } => {
                    match inner.retry.should_retry(rate_limit_retries, start, retry_after) {
                        RetryDecision::Retry {
                            delay,
                            attempt_number,
                        } => {
                            warn!(
                                request = %request.describe(),
                                attempt = attempt_number,
                                delay_ms = delay.as_millis() as u64,
                                "Rate limited by CRM, backing off"
                            );
                            tokio::time::sleep(delay).await;
                            rate_limit_retries = attempt_number;
                        }
                        RetryDecision::Stop { reason, .. } => {
                            warn!(request = %request.describe(), "Giving up on rate limit: {}", reason);
                            return Err(CrmError::RateLimited {
                                attempts: rate_limit_retries + 1,
                            });
                        }
                    }
                }
                other => return Ok(other),
            }
        }
    }

    async fn send(
        &self,
        request: &CrmRequest,
        credential: &AccessCredential,
    ) -> CrmResult<RemoteOutcome> {
        let inner = &self.inner;
        let url = inner.endpoint.url(credential.region, &request.segments)?;

        let mut builder = inner
            .http
            .request(request.method.clone(), url)
            .header(
                AUTHORIZATION,
                format!("Zoho-oauthtoken {}", credential.token.expose()),
            );
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(request = %request.describe(), region = %credential.region, "Calling CRM");
        let (status, retry_after, body) = inner
            .timeouts
            .execute_with_timeout(async {
                let response = builder.send().await?;
                let status = response.status().as_u16();
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                let body = response.text().await?;
                Ok::<_, reqwest::Error>((status, retry_after, body))
            })
            .await?;

        debug!(request = %request.describe(), status, "CRM responded");
        Ok(normalize(status, retry_after, &body))
    }
}

fn first_row(body: &JsonValue) -> Option<&JsonValue> {
    body.get("data")
        .and_then(|d| d.as_array())
        .and_then(|rows| rows.first())
}

fn array_at(body: &JsonValue, key: &str) -> Vec<JsonValue> {
    body.get(key)
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

fn record_page(body: JsonValue, pagination: &Pagination) -> CrmResult<RecordPage> {
    let records = match body.get("data") {
        Some(JsonValue::Array(rows)) => rows
            .iter()
            .cloned()
            .map(zohocrm_core::record_from_value)
            .collect::<CrmResult<Vec<_>>>()?,
        _ => Vec::new(),
    };
    let mut info: PageInfo = body
        .get("info")
        .cloned()
        .and_then(|info| serde_json::from_value(info).ok())
        .unwrap_or_default();
    info.page.get_or_insert(pagination.page());
    info.per_page.get_or_insert(pagination.per_page());
    info.count.get_or_insert(records.len() as u64);
    Ok(RecordPage { records, info })
}

fn write_confirmation(
    body: &JsonValue,
    fields: Record,
    id: Option<&RecordId>,
) -> CrmResult<WriteConfirmation> {
    let row = first_row(body).ok_or_else(|| CrmError::UnexpectedRemoteError {
        status: 200,
        message: "write response has no data rows".to_string(),
    })?;
    let details = row.get("details").cloned().unwrap_or(JsonValue::Null);
    let returned_id = details.get("id").and_then(|v| v.as_str()).map(str::to_string);
    let id = returned_id
        .or_else(|| id.map(|id| id.as_str().to_string()))
        .ok_or_else(|| CrmError::UnexpectedRemoteError {
            status: 200,
            message: "write response does not carry a record id".to_string(),
        })?;
    Ok(WriteConfirmation {
        id,
        fields,
        details,
        message: row
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string),
    })
}

/// Errors for calls addressed to a single record
fn record_error(outcome: RemoteOutcome, module: &ModuleName, id: &RecordId) -> CrmError {
    match outcome {
        RemoteOutcome::NotFound { .. } | RemoteOutcome::NoContent => {
            CrmError::record_not_found(module.as_str(), id.as_str())
        }
        other => module_error(other, module),
    }
}

/// Errors for calls addressed to a module
fn module_error(outcome: RemoteOutcome, module: &ModuleName) -> CrmError {
    match outcome {
        RemoteOutcome::ModuleNotFound { .. } | RemoteOutcome::NotFound { .. } => {
            CrmError::ModuleNotFound(module.to_string())
        }
        other => generic_error(other),
    }
}

fn generic_error(outcome: RemoteOutcome) -> CrmError {
    match outcome {
        RemoteOutcome::Validation { message, fields } => {
            CrmError::ValidationFailed { message, fields }
        }
        RemoteOutcome::InvalidQuery { message } => CrmError::InvalidCriterion(message),
        RemoteOutcome::ModuleNotFound { message } => CrmError::ModuleNotFound(message),
        RemoteOutcome::NotFound { message } => CrmError::UnexpectedRemoteError {
            status: 404,
            message,
        },
        RemoteOutcome::Unexpected { status, message } => {
            CrmError::UnexpectedRemoteError { status, message }
        }
        RemoteOutcome::NoContent => CrmError::UnexpectedRemoteError {
            status: 204,
            message: "no content".to_string(),
        },
        RemoteOutcome::Success(_) => CrmError::UnexpectedRemoteError {
            status: 200,
            message: "unexpected response shape".to_string(),
        },
        // Absorbed by `execute`
        RemoteOutcome::RateLimited { .. } => CrmError::RateLimited { attempts: 1 },
        RemoteOutcome::AuthRejected { message } => CrmError::AuthUnavailable(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_page_fills_missing_info() {
        let pagination = Pagination::new(2, 50).unwrap();
        let page = record_page(
            json!({"data": [{"id": "1", "Last_Name": "Doe"}], "info": {"more_records": true}}),
            &pagination,
        )
        .unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.info.page, Some(2));
        assert_eq!(page.info.per_page, Some(50));
        assert_eq!(page.info.count, Some(1));
        assert_eq!(page.info.more_records, Some(true));
    }

    #[test]
    fn test_write_confirmation_uses_returned_id() {
        let mut fields = Record::new();
        fields.insert("Last_Name".to_string(), json!("Doe"));
        let body = json!({"data": [{
            "code": "SUCCESS",
            "details": {"id": "4150868000000624001", "Modified_Time": "2024-01-01T10:00:00+05:30"},
            "message": "record added",
            "status": "success"
        }]});
        let confirmation = write_confirmation(&body, fields.clone(), None).unwrap();
        assert_eq!(confirmation.id, "4150868000000624001");
        assert_eq!(confirmation.fields, fields);
        assert_eq!(confirmation.message.as_deref(), Some("record added"));

        let missing = write_confirmation(&json!({"data": []}), fields, None);
        assert!(missing.is_err());
    }

    #[test]
    fn test_error_mapping_by_context() {
        let module = ModuleName::leads();
        let id = RecordId::new(&module, "42").unwrap();
        let not_found = RemoteOutcome::NotFound {
            message: "gone".to_string(),
        };
        assert_eq!(record_error(not_found.clone(), &module, &id).kind(), "RecordNotFound");
        assert_eq!(module_error(not_found, &module).kind(), "ModuleNotFound");
        assert_eq!(
            record_error(RemoteOutcome::NoContent, &module, &id).kind(),
            "RecordNotFound"
        );
        let validation = RemoteOutcome::Validation {
            message: "bad".to_string(),
            fields: vec![],
        };
        assert_eq!(record_error(validation, &module, &id).kind(), "ValidationFailed");
    }
}
