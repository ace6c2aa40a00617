//! zoho-crm-mcp entry point

use clap::Parser;
use tracing::info;
use zohocrm_cli::{
    cli::{Cli, Commands},
    commands::{resolve_config, CallCommand, CheckCommand, ServeCommand, ToolsCommand},
    error::CliResult,
    utils::{init_tracing, ColoredOutput},
};

#[tokio::main]
async fn main() {
    let exit_code = match run().await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{} {}", ColoredOutput::error("Error:"), e);
            1
        }
    };

    std::process::exit(exit_code);
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let config = resolve_config(&cli)?;
    init_tracing(&config.logging, cli.verbose)?;

    info!("Zoho CRM MCP v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve {
            allow_patterns,
            deny_patterns,
            max_concurrency,
        } => ServeCommand::run(config, allow_patterns, deny_patterns, max_concurrency).await,
        Commands::Tools => ToolsCommand::run(&config),
        Commands::Call {
            tool,
            args,
            args_file,
        } => CallCommand::run(config, &tool, args, args_file).await,
        Commands::Check => CheckCommand::run(config).await,
    }
}
