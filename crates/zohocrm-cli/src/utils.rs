//! Utility functions for the CLI

use crate::error::{CliError, CliResult};
use anyhow::Context;
use colored::{ColoredString, Colorize};
use std::path::Path;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zohocrm_config::LoggingConfig;

/// Install the global subscriber. Output goes to stderr; stdout carries
/// the MCP protocol.
pub fn init_tracing(logging: &LoggingConfig, verbose: bool) -> CliResult<()> {
    let directive = if verbose { "debug" } else { logging.filter_directive() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| CliError::General(format!("Failed to set tracing subscriber: {}", e)))?;

    Ok(())
}

/// Utility for colored console output
pub struct ColoredOutput;

impl ColoredOutput {
    pub fn success(msg: &str) -> ColoredString {
        msg.green().bold()
    }

    pub fn error(msg: &str) -> ColoredString {
        msg.red().bold()
    }

    pub fn warning(msg: &str) -> ColoredString {
        msg.yellow().bold()
    }

    pub fn dim(msg: &str) -> ColoredString {
        msg.dimmed()
    }

    pub fn highlight(msg: &str) -> ColoredString {
        msg.cyan().bold()
    }
}

/// Tool arguments from an inline JSON string or a JSON/YAML file
pub fn read_arguments(
    inline: Option<String>,
    file: Option<&Path>,
) -> CliResult<Option<serde_json::Value>> {
    match (inline, file) {
        (Some(text), None) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| CliError::InvalidArgument(format!("Invalid JSON arguments: {}", e))),
        (None, Some(path)) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading arguments file '{}'", path.display()))?;
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&content) {
                return Ok(Some(value));
            }
            serde_yaml::from_str(&content).map(Some).map_err(|e| {
                CliError::InvalidArgument(format!(
                    "Invalid JSON/YAML arguments file '{}': {}",
                    path.display(),
                    e
                ))
            })
        }
        (None, None) => Ok(None),
        (Some(_), Some(_)) => Err(CliError::InvalidArgument(
            "--args and --args-file are mutually exclusive".to_string(),
        )),
    }
}
