use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use zohocrm_core::ConnectionRef;

pub const DEFAULT_API_BASE_TEMPLATE: &str = "https://www.zohoapis.{domain}/crm/v2";

/// Process-wide configuration, immutable once loaded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub crm: CrmConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Token broker account and connection to use
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub base_url: String,
    pub secret_key: String,
    pub connection_id: String,
    pub integration_id: String,
}

impl BrokerConfig {
    pub fn connection(&self) -> ConnectionRef {
        ConnectionRef::new(self.connection_id.clone(), self.integration_id.clone())
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("base_url", &self.base_url)
            .field("secret_key", &"***REDACTED***")
            .field("connection_id", &self.connection_id)
            .field("integration_id", &self.integration_id)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmConfig {
    /// API base URL; `{domain}` is replaced with the region's domain suffix
    pub api_base_template: String,
    /// Per-call timeout for broker and CRM requests
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// 0 disables the credential cache
    pub credential_ttl_secs: u64,
    pub retry: RetrySettings,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            api_base_template: DEFAULT_API_BASE_TEMPLATE.to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
            credential_ttl_secs: 300,
            retry: RetrySettings::default(),
        }
    }
}

impl CrmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Never longer than the per-call timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.min(self.timeout_secs))
    }

    pub fn credential_ttl(&self) -> Duration {
        Duration::from_secs(self.credential_ttl_secs)
    }
}

/// Backoff schedule used when the CRM signals a rate limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
    pub total_timeout_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
            backoff_multiplier: 2.0,
            jitter: true,
            total_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Tool name patterns to expose (empty exposes all)
    pub allow: Vec<String>,
    /// Tool name patterns to hide
    pub deny: Vec<String>,
    pub max_concurrency: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            allow: Vec::new(),
            deny: Vec::new(),
            max_concurrency: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub debug: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            debug: false,
        }
    }
}

impl LoggingConfig {
    /// Filter directive for the subscriber when `RUST_LOG` is not set
    pub fn filter_directive(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.level
        }
    }
}

impl AppConfig {
    /// Check that the configuration can serve requests
    pub fn validate(&self) -> ConfigResult<()> {
        let broker = &self.broker;
        for (name, value) in [
            ("broker.base_url (NANGO_BASE_URL)", &broker.base_url),
            ("broker.secret_key (NANGO_SECRET_KEY)", &broker.secret_key),
            ("broker.connection_id (NANGO_CONNECTION_ID)", &broker.connection_id),
            ("broker.integration_id (NANGO_INTEGRATION_ID)", &broker.integration_id),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField(name.to_string()));
            }
        }

        let broker_url = url::Url::parse(&broker.base_url).map_err(|e| ConfigError::InvalidValue {
            key: "broker.base_url".to_string(),
            message: e.to_string(),
        })?;
        if !matches!(broker_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                key: "broker.base_url".to_string(),
                message: format!("unsupported scheme '{}'", broker_url.scheme()),
            });
        }

        let sample = self.crm.api_base_template.replace("{domain}", "com");
        url::Url::parse(&sample).map_err(|e| ConfigError::InvalidValue {
            key: "crm.api_base_template".to_string(),
            message: e.to_string(),
        })?;

        if self.crm.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "crm.timeout_secs must be greater than 0".to_string(),
            ));
        }
        let retry = &self.crm.retry;
        if retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::Validation(
                "crm.retry.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }
        if retry.initial_delay_ms > retry.max_delay_ms {
            return Err(ConfigError::Validation(
                "crm.retry.initial_delay_ms cannot exceed crm.retry.max_delay_ms".to_string(),
            ));
        }
        if self.server.max_concurrency == 0 {
            return Err(ConfigError::Validation(
                "server.max_concurrency must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
