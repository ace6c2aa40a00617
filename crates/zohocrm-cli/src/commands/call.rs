//! `call`: run a single tool from the command line

use crate::error::{CliError, CliResult};
use crate::utils::{read_arguments, ColoredOutput};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use zohocrm_config::AppConfig;
use zohocrm_connectors::CrmClient;
use zohocrm_mcp::{GovernanceConfig, McpServer};

pub struct CallCommand;

impl CallCommand {
    pub async fn run(
        config: AppConfig,
        tool: &str,
        args: Option<String>,
        args_file: Option<PathBuf>,
    ) -> CliResult<()> {
        let arguments = read_arguments(args, args_file.as_deref())?;
        config.validate()?;

        let client = CrmClient::from_config(&config)?;
        let server = McpServer::new(client, GovernanceConfig::from_config(&config));

        info!("Calling tool: {}", tool);
        let started = Instant::now();
        let response = server.call_tool(tool, arguments).await?;
        let elapsed = started.elapsed();

        let body = response.structured_content.unwrap_or_default();
        println!("{}", serde_json::to_string_pretty(&body)?);

        if response.is_error {
            let kind = body
                .pointer("/error/kind")
                .and_then(|k| k.as_str())
                .unwrap_or("UnexpectedRemoteError")
                .to_string();
            return Err(CliError::ToolFailed {
                tool: tool.to_string(),
                kind,
            });
        }

        eprintln!(
            "{} {}",
            ColoredOutput::success("✓"),
            ColoredOutput::dim(&format!("{} completed in {}ms", tool, elapsed.as_millis()))
        );
        Ok(())
    }
}
