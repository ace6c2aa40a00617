//! Token broker client: resolves an access token and CRM region for a connection

use crate::error::ConnectorError;
use crate::http::TimeoutManager;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header::AUTHORIZATION, Client, StatusCode};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;
use zohocrm_core::{
    redact_secrets, AccessCredential, ConnectionRef, CrmError, CrmResult, Region, SecretToken,
};

/// Broker error codes meaning the grant can no longer be refreshed
const REVOKED_GRANT_MARKERS: &[&str] = &[
    "invalid_grant",
    "refresh_token_external_error",
    "connection_refresh_exhausted",
    "refresh_exhausted",
    "revoked",
];

/// Anything that can produce a fresh credential for a connection
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch_credential(&self, connection: &ConnectionRef) -> CrmResult<AccessCredential>;
}

#[derive(Debug, Deserialize)]
struct ConnectionResponse {
    #[serde(default)]
    credentials: Option<CredentialsBody>,
    #[serde(default)]
    connection_config: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
struct CredentialsBody {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    raw: Option<JsonValue>,
}

#[derive(Clone)]
pub struct BrokerClient {
    http: Client,
    base_url: String,
    secret_key: SecretToken,
    timeouts: TimeoutManager,
}

impl std::fmt::Debug for BrokerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl BrokerClient {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        secret_key: SecretToken,
        timeouts: TimeoutManager,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key,
            timeouts,
        }
    }

    fn connection_url(&self, connection: &ConnectionRef) -> String {
        format!(
            "{}/connection/{}",
            self.base_url,
            urlencoding::encode(&connection.connection_id)
        )
    }

    /// Keep the broker secret out of anything that reaches a caller
    fn scrub(&self, message: &str) -> String {
        redact_secrets(message, &[self.secret_key.expose()])
    }

    fn map_transport_error(&self, err: ConnectorError) -> CrmError {
        match err {
            ConnectorError::Timeout(ms) => CrmError::NetworkTimeout(ms),
            other => CrmError::AuthUnavailable(
                self.scrub(&format!("token broker unreachable: {}", other)),
            ),
        }
    }
}

#[async_trait]
impl CredentialSource for BrokerClient {
    async fn fetch_credential(&self, connection: &ConnectionRef) -> CrmResult<AccessCredential> {
        if !connection.is_complete() {
            return Err(CrmError::ConnectionNotFound(
                "connection id and integration id must both be set".to_string(),
            ));
        }

        let request = self
            .http
            .get(self.connection_url(connection))
            .query(&[
                ("provider_config_key", connection.integration_id.as_str()),
                ("refresh_token", "true"),
            ])
            .header(AUTHORIZATION, format!("Bearer {}", self.secret_key.expose()));

        let (status, body) = self
            .timeouts
            .execute_with_timeout(async {
                let response = request.send().await?;
                let status = response.status();
                let body = response.text().await?;
                Ok::<_, reqwest::Error>((status, body))
            })
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !status.is_success() {
            return Err(self.map_error_status(status, &body, connection));
        }

        let credential = parse_connection_body(&body)?;
        debug!(
            connection = %connection,
            region = %credential.region,
            "Resolved credential from token broker"
        );
        Ok(credential)
    }
}

impl BrokerClient {
    fn map_error_status(&self, status: StatusCode, body: &str, connection: &ConnectionRef) -> CrmError {
        let message = self.scrub(&broker_error_message(body));
        match status.as_u16() {
            404 => CrmError::ConnectionNotFound(format!("{}: {}", connection, message)),
            400 | 401 | 403 | 424 if is_revoked_grant(body) => {
                CrmError::CredentialExpiredBeyondRefresh(message)
            }
            code => CrmError::AuthUnavailable(format!("token broker returned {}: {}", code, message)),
        }
    }
}

/// Extract a readable message from a broker error body
fn broker_error_message(body: &str) -> String {
    let parsed: Option<JsonValue> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|json| {
        json.pointer("/error/message")
            .or_else(|| json.get("message"))
            .or_else(|| json.get("error"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    });
    match from_json {
        Some(message) => message,
        None if body.trim().is_empty() => "no details".to_string(),
        None => body.chars().take(200).collect(),
    }
}

fn is_revoked_grant(body: &str) -> bool {
    let lower = body.to_lowercase();
    REVOKED_GRANT_MARKERS.iter().any(|marker| lower.contains(marker))
}

fn parse_connection_body(body: &str) -> CrmResult<AccessCredential> {
    let parsed: ConnectionResponse = serde_json::from_str(body).map_err(|e| {
        CrmError::AuthUnavailable(format!("token broker returned an unreadable body: {}", e))
    })?;

    let credentials = parsed.credentials.ok_or_else(|| {
        CrmError::AuthUnavailable("token broker response has no credentials".to_string())
    })?;

    let token = credentials
        .access_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            CrmError::AuthUnavailable("token broker response has no access token".to_string())
        })?;

    let region = resolve_region(parsed.connection_config.as_ref(), credentials.raw.as_ref())
        .ok_or_else(|| {
            CrmError::AuthUnavailable(
                "token broker response does not identify the CRM region".to_string(),
            )
        })?;

    let expires_at = credentials.expires_at.as_deref().and_then(|raw| {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| debug!("Ignoring unparseable expires_at: {}", e))
            .ok()
    });

    Ok(AccessCredential::new(SecretToken::new(token), region, expires_at))
}

/// Region precedence: connection extension, then the token's api_domain,
/// then an api_domain stored on the connection
fn resolve_region(connection_config: Option<&JsonValue>, raw: Option<&JsonValue>) -> Option<Region> {
    let from_extension = connection_config
        .and_then(|c| c.get("extension"))
        .and_then(|v| v.as_str())
        .and_then(Region::from_domain);
    let from_raw = || {
        raw.and_then(|r| r.get("api_domain"))
            .and_then(|v| v.as_str())
            .and_then(Region::from_api_domain)
    };
    let from_config_domain = || {
        connection_config
            .and_then(|c| c.get("api_domain"))
            .and_then(|v| v.as_str())
            .and_then(Region::from_api_domain)
    };
    from_extension.or_else(from_raw).or_else(from_config_domain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::build_client;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn client(server: &MockServer) -> BrokerClient {
        let timeouts = TimeoutManager::new(Duration::from_secs(2), Duration::from_secs(5));
        BrokerClient::new(
            build_client(&timeouts).unwrap(),
            server.base_url(),
            SecretToken::new("sk-broker"),
            timeouts,
        )
    }

    fn connection() -> ConnectionRef {
        ConnectionRef::new("conn-1", "zoho-crm")
    }

    #[tokio::test]
    async fn test_resolves_token_and_region() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/connection/conn-1")
                .query_param("provider_config_key", "zoho-crm")
                .query_param("refresh_token", "true")
                .header("authorization", "Bearer sk-broker");
            then.status(200).json_body(json!({
                "connection_id": "conn-1",
                "connection_config": {"extension": "eu"},
                "credentials": {
                    "type": "OAUTH2",
                    "access_token": "1000.token",
                    "expires_at": "2030-01-01T00:00:00.000Z",
                    "raw": {"api_domain": "https://www.zohoapis.eu"}
                }
            }));
        });

        let credential = client(&server).fetch_credential(&connection()).await.unwrap();
        mock.assert();
        assert_eq!(credential.token.expose(), "1000.token");
        assert_eq!(credential.region, Region::Eu);
        assert!(credential.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_region_from_api_domain() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/connection/conn-1");
            then.status(200).json_body(json!({
                "credentials": {
                    "access_token": "1000.token",
                    "raw": {"api_domain": "https://www.zohoapis.in"}
                }
            }));
        });

        let credential = client(&server).fetch_credential(&connection()).await.unwrap();
        assert_eq!(credential.region, Region::In);
        assert!(credential.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_missing_region_is_auth_unavailable() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/connection/conn-1");
            then.status(200)
                .json_body(json!({"credentials": {"access_token": "1000.token"}}));
        });

        let err = client(&server).fetch_credential(&connection()).await.unwrap_err();
        assert_eq!(err.kind(), "AuthUnavailable");
        assert!(!err.to_string().contains("1000.token"));
    }

    #[tokio::test]
    async fn test_empty_ids_skip_network() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.any_request();
            then.status(200);
        });

        let err = client(&server)
            .fetch_credential(&ConnectionRef::new("", "zoho-crm"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ConnectionNotFound");
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/connection/missing");
            then.status(404)
                .json_body(json!({"error": {"code": "unknown_connection", "message": "No connection"}}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/connection/revoked");
            then.status(424).json_body(json!({
                "error": {"code": "refresh_token_external_error", "message": "invalid_grant"}
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/connection/broken");
            then.status(500).body("upstream failure for sk-broker");
        });

        let client = client(&server);
        let err = client
            .fetch_credential(&ConnectionRef::new("missing", "zoho-crm"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ConnectionNotFound");

        let err = client
            .fetch_credential(&ConnectionRef::new("revoked", "zoho-crm"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "CredentialExpiredBeyondRefresh");

        let err = client
            .fetch_credential(&ConnectionRef::new("broken", "zoho-crm"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "AuthUnavailable");
        assert!(!err.to_string().contains("sk-broker"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/connection/conn-1");
            then.status(200).delay(Duration::from_millis(500));
        });
        let timeouts = TimeoutManager::new(Duration::from_millis(50), Duration::from_millis(100));
        let client = BrokerClient::new(
            build_client(&timeouts).unwrap(),
            server.base_url(),
            SecretToken::new("sk-broker"),
            timeouts,
        );

        let err = client.fetch_credential(&connection()).await.unwrap_err();
        assert_eq!(err.kind(), "NetworkTimeout");
    }

    #[test]
    fn test_region_precedence() {
        let config = json!({"extension": "com.au", "api_domain": "https://www.zohoapis.jp"});
        let raw = json!({"api_domain": "https://www.zohoapis.eu"});
        assert_eq!(resolve_region(Some(&config), Some(&raw)), Some(Region::Au));
        assert_eq!(resolve_region(None, Some(&raw)), Some(Region::Eu));
        let config = json!({"api_domain": "https://www.zohoapis.jp"});
        assert_eq!(resolve_region(Some(&config), None), Some(Region::Jp));
        assert_eq!(resolve_region(None, None), None);
    }
}
