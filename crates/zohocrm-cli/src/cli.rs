//! CLI argument definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "zoho-crm-mcp",
    about = "Zoho CRM tools for AI assistants over MCP",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (YAML or JSON)
    #[arg(long, env = "ZOHO_CRM_CONFIG", help = "Path to a YAML or JSON configuration file")]
    pub config: Option<PathBuf>,

    /// Dotenv file loaded before reading the environment
    #[arg(long, env = "ZOHO_CRM_ENV_FILE", help = "Path to a .env file")]
    pub env_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, help = "Disable colored output")]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the CRM tools over MCP on stdin/stdout
    Serve {
        /// Allow patterns for tool filtering (e.g. "get_*", "search_crm_records")
        #[arg(long = "allow")]
        allow_patterns: Vec<String>,
        /// Deny patterns for tool filtering (e.g. "delete_*")
        #[arg(long = "deny")]
        deny_patterns: Vec<String>,
        /// Maximum concurrent tool calls
        #[arg(long)]
        max_concurrency: Option<usize>,
    },

    /// Print the tool catalog as JSON
    Tools,

    /// Invoke one tool and print its result
    Call {
        /// Tool name (e.g. get_crm_records)
        tool: String,

        /// Tool arguments as a JSON object
        #[arg(long, help = "Tool arguments as a JSON string")]
        args: Option<String>,

        /// Tool arguments from a JSON or YAML file
        #[arg(long, conflicts_with = "args", help = "Read tool arguments from a JSON or YAML file")]
        args_file: Option<PathBuf>,
    },

    /// Resolve a credential through the token broker and report its region and expiry
    Check,
}
