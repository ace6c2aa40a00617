use crate::env_resolver::EnvResolver;
use crate::error::{ConfigError, ConfigResult};
use crate::settings::AppConfig;
use serde_json::Value as JsonValue;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Supported file formats for configuration
#[derive(Debug, Clone, PartialEq)]
pub enum FileFormat {
    Yaml,
    Json,
}

impl FileFormat {
    /// Detect file format from extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => Ok(FileFormat::Yaml),
            Some("json") => Ok(FileFormat::Json),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => Err(ConfigError::UnsupportedFormat("no extension".to_string())),
        }
    }
}

pub const ENV_BROKER_BASE_URL: &str = "NANGO_BASE_URL";
pub const ENV_BROKER_SECRET_KEY: &str = "NANGO_SECRET_KEY";
pub const ENV_CONNECTION_ID: &str = "NANGO_CONNECTION_ID";
pub const ENV_INTEGRATION_ID: &str = "NANGO_INTEGRATION_ID";
pub const ENV_API_BASE: &str = "ZOHO_CRM_API_BASE";
pub const ENV_TIMEOUT_SECS: &str = "ZOHO_CRM_TIMEOUT_SECS";
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "ZOHO_CRM_CONNECT_TIMEOUT_SECS";
pub const ENV_MAX_RETRIES: &str = "ZOHO_CRM_MAX_RETRIES";
pub const ENV_RETRY_INITIAL_DELAY_MS: &str = "ZOHO_CRM_RETRY_INITIAL_DELAY_MS";
pub const ENV_RETRY_MAX_DELAY_MS: &str = "ZOHO_CRM_RETRY_MAX_DELAY_MS";
pub const ENV_CREDENTIAL_TTL_SECS: &str = "ZOHO_CRM_CREDENTIAL_TTL_SECS";
pub const ENV_LOG_LEVEL: &str = "ZOHO_CRM_LOG_LEVEL";
pub const ENV_DEBUG: &str = "ZOHO_CRM_DEBUG";

/// Builds an [`AppConfig`] from defaults, an optional file, an optional
/// `.env` file and the environment, later sources overriding earlier ones.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_file: Option<PathBuf>,
    resolver: EnvResolver,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Explicit `.env` file; when unset a `.env` in the working directory is
    /// picked up if present
    pub fn with_env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = Some(path.into());
        self
    }

    pub fn with_resolver(mut self, resolver: EnvResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Load and validate against the process environment
    pub fn load(&self) -> ConfigResult<AppConfig> {
        let config = self.resolve()?;
        config.validate()?;
        Ok(config)
    }

    /// Load without validating, for commands that never reach the broker
    pub fn resolve(&self) -> ConfigResult<AppConfig> {
        self.load_env_file()?;
        self.resolve_with(&|name| env::var(name).ok())
    }

    /// Load against an explicit variable lookup. `.env` files are not read.
    pub fn resolve_with(&self, lookup: &dyn Fn(&str) -> Option<String>) -> ConfigResult<AppConfig> {
        let mut config = match &self.file {
            Some(path) => self.load_file(path, lookup)?,
            None => AppConfig::default(),
        };
        apply_env(&mut config, lookup)?;
        Ok(config)
    }

    fn load_env_file(&self) -> ConfigResult<()> {
        match &self.env_file {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| ConfigError::EnvFile {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
                debug!(path = %path.display(), "Loaded env file");
            }
            None => {
                if let Ok(path) = dotenvy::dotenv() {
                    debug!(path = %path.display(), "Loaded .env from working directory");
                }
            }
        }
        Ok(())
    }

    fn load_file(
        &self,
        path: &Path,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> ConfigResult<AppConfig> {
        let format = FileFormat::from_path(path)?;
        let content = fs::read_to_string(path)?;
        let config = parse_content(&content, format, &self.resolver, lookup)?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }
}

/// Parse file content, resolving `${VAR}` references before deserializing
pub fn parse_content(
    content: &str,
    format: FileFormat,
    resolver: &EnvResolver,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> ConfigResult<AppConfig> {
    let raw: JsonValue = match format {
        FileFormat::Yaml => serde_yaml::from_str(content)?,
        FileFormat::Json => serde_json::from_str(content)?,
    };
    // An empty YAML document parses as null
    let raw = if raw.is_null() {
        JsonValue::Object(Default::default())
    } else {
        raw
    };
    let resolved = resolver.resolve_with(&raw, lookup)?;
    Ok(serde_json::from_value(resolved)?)
}

/// Overlay the dedicated environment variables onto `config`
pub fn apply_env(
    config: &mut AppConfig,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> ConfigResult<()> {
    let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = text(ENV_BROKER_BASE_URL) {
        config.broker.base_url = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = text(ENV_BROKER_SECRET_KEY) {
        config.broker.secret_key = v;
    }
    if let Some(v) = text(ENV_CONNECTION_ID) {
        config.broker.connection_id = v;
    }
    if let Some(v) = text(ENV_INTEGRATION_ID) {
        config.broker.integration_id = v;
    }
    if let Some(v) = text(ENV_API_BASE) {
        config.crm.api_base_template = v.trim_end_matches('/').to_string();
    }
    if let Some(v) = parse_var(lookup, ENV_TIMEOUT_SECS)? {
        config.crm.timeout_secs = v;
    }
    if let Some(v) = parse_var(lookup, ENV_CONNECT_TIMEOUT_SECS)? {
        config.crm.connect_timeout_secs = v;
    }
    if let Some(v) = parse_var(lookup, ENV_MAX_RETRIES)? {
        config.crm.retry.max_retries = v;
    }
    if let Some(v) = parse_var(lookup, ENV_RETRY_INITIAL_DELAY_MS)? {
        config.crm.retry.initial_delay_ms = v;
    }
    if let Some(v) = parse_var(lookup, ENV_RETRY_MAX_DELAY_MS)? {
        config.crm.retry.max_delay_ms = v;
    }
    if let Some(v) = parse_var(lookup, ENV_CREDENTIAL_TTL_SECS)? {
        config.crm.credential_ttl_secs = v;
    }
    if let Some(v) = text(ENV_LOG_LEVEL) {
        config.logging.level = v.to_lowercase();
    }
    if let Some(v) = text(ENV_DEBUG) {
        config.logging.debug = parse_bool(ENV_DEBUG, &v)?;
    }
    Ok(())
}

fn parse_var<T>(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{}': {}", raw, e),
            }),
        _ => Ok(None),
    }
}

fn parse_bool(key: &str, raw: &str) -> ConfigResult<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{}' is not a boolean", other),
        }),
    }
}
