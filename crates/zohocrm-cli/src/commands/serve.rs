//! `serve`: MCP over stdio

use crate::error::{CliError, CliResult};
use tracing::info;
use zohocrm_config::AppConfig;
use zohocrm_connectors::CrmClient;
use zohocrm_mcp::{serve_stdio, GovernanceConfig, McpServer};

pub struct ServeCommand;

impl ServeCommand {
    pub async fn run(
        mut config: AppConfig,
        allow_patterns: Vec<String>,
        deny_patterns: Vec<String>,
        max_concurrency: Option<usize>,
    ) -> CliResult<()> {
        Self::apply_overrides(&mut config, allow_patterns, deny_patterns, max_concurrency)?;
        config.validate()?;

        let client = CrmClient::from_config(&config)?;
        info!("Serving Zoho CRM tools for connection {}", client.connection());

        let governance = GovernanceConfig::from_config(&config);
        serve_stdio(McpServer::new(client, governance)).await?;
        Ok(())
    }

    /// Command line patterns replace the configured ones
    fn apply_overrides(
        config: &mut AppConfig,
        allow_patterns: Vec<String>,
        deny_patterns: Vec<String>,
        max_concurrency: Option<usize>,
    ) -> CliResult<()> {
        if !allow_patterns.is_empty() {
            config.server.allow = allow_patterns;
        }
        if !deny_patterns.is_empty() {
            config.server.deny = deny_patterns;
        }
        if let Some(max) = max_concurrency {
            if max == 0 {
                return Err(CliError::InvalidArgument(
                    "--max-concurrency must be at least 1".to_string(),
                ));
            }
            config.server.max_concurrency = max;
        }
        Ok(())
    }
}
