pub mod env_resolver;
pub mod error;
pub mod loader;
pub mod settings;

pub use env_resolver::{EnvResolver, EnvResolverError};
pub use error::{ConfigError, ConfigResult};
pub use loader::{apply_env, parse_content, ConfigLoader, FileFormat};
pub use settings::{
    AppConfig, BrokerConfig, CrmConfig, LoggingConfig, RetrySettings, ServerConfig,
    DEFAULT_API_BASE_TEMPLATE,
};
