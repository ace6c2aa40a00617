//! Error handling for the MCP server

use crate::jsonrpc::JsonRpcError;
use thiserror::Error;

/// Result type for MCP operations
pub type McpResult<T> = Result<T, McpError>;

/// Protocol-level failures. CRM errors raised while running a tool are
/// reported inside the tool result instead.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl McpError {
    /// Convert to JSON-RPC error
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        match self {
            McpError::Serialization(e) => JsonRpcError::parse_error().with_data(serde_json::json!({
                "message": e.to_string()
            })),
            McpError::InvalidArguments(msg) => {
                JsonRpcError::invalid_params().with_data(serde_json::json!({
                    "message": msg
                }))
            }
            McpError::ToolNotFound(msg) => {
                JsonRpcError::method_not_found().with_data(serde_json::json!({
                    "message": msg
                }))
            }
            McpError::PermissionDenied(msg) => {
                JsonRpcError::invalid_request().with_data(serde_json::json!({
                    "message": format!("Permission denied: {}", msg)
                }))
            }
            _ => JsonRpcError::internal_error().with_data(serde_json::json!({
                "message": self.to_string()
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::{INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND};

    #[test]
    fn test_jsonrpc_codes() {
        assert_eq!(
            McpError::InvalidArguments("module is required".into()).to_jsonrpc_error().code,
            INVALID_PARAMS
        );
        assert_eq!(
            McpError::ToolNotFound("nope".into()).to_jsonrpc_error().code,
            METHOD_NOT_FOUND
        );
        assert_eq!(
            McpError::PermissionDenied("delete_crm_record".into()).to_jsonrpc_error().code,
            INVALID_REQUEST
        );
    }
}
