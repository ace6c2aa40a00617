//! `tools`: print the catalog

use crate::error::CliResult;
use zohocrm_config::AppConfig;
use zohocrm_mcp::{tools, GovernanceConfig};

pub struct ToolsCommand;

impl ToolsCommand {
    pub fn run(config: &AppConfig) -> CliResult<()> {
        println!("{}", Self::render(config)?);
        Ok(())
    }

    /// Catalog as exposed under the configured allow/deny patterns
    fn render(config: &AppConfig) -> CliResult<String> {
        let governance = GovernanceConfig::from_config(config);
        let tools: Vec<_> = tools::catalog()
            .into_iter()
            .filter(|tool| governance.is_tool_allowed(&tool.name))
            .collect();
        Ok(serde_json::to_string_pretty(&tools)?)
    }
}
