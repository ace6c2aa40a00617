//! Error types for the CLI

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] zohocrm_config::ConfigError),

    #[error("Connector error: {0}")]
    Connector(#[from] zohocrm_connectors::ConnectorError),

    #[error("CRM error: {0}")]
    Crm(#[from] zohocrm_core::CrmError),

    #[error("MCP error: {0}")]
    Mcp(#[from] zohocrm_mcp::McpError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Tool '{tool}' failed: {kind}")]
    ToolFailed { tool: String, kind: String },

    #[error("General error: {0}")]
    General(String),
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        Self::General(format!("{:#}", err))
    }
}

pub type CliResult<T> = Result<T, CliError>;
