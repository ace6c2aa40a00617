pub mod call;
pub mod check;
pub mod serve;
pub mod tools;

pub use call::CallCommand;
pub use check::CheckCommand;
pub use serve::ServeCommand;
pub use tools::ToolsCommand;

use crate::cli::Cli;
use crate::error::CliResult;
use zohocrm_config::{AppConfig, ConfigLoader};

/// Layered configuration without validation; commands validate what they need
pub fn resolve_config(cli: &Cli) -> CliResult<AppConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    if let Some(path) = &cli.env_file {
        loader = loader.with_env_file(path);
    }
    Ok(loader.resolve()?)
}
