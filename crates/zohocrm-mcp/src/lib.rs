//! Zoho CRM MCP (Model Context Protocol) server
//!
//! Exposes the CRM adapter as MCP tools over newline-delimited JSON-RPC 2.0.

pub mod dispatch;
pub mod error;
pub mod governance;
pub mod jsonrpc;
pub mod mcp;
pub mod server;
pub mod tools;

pub use dispatch::ToolCall;
pub use error::{McpError, McpResult};
pub use governance::GovernanceConfig;
pub use server::{serve, serve_stdio, McpServer};
