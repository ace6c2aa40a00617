//! MCP server: JSON-RPC dispatch and the stdio transport

use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use zohocrm_connectors::CrmClient;
use zohocrm_core::{create_debug_string, CrmError};

use crate::{
    dispatch::ToolCall,
    jsonrpc::{error_response, success_response, JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION},
    mcp::{
        Implementation, InitializeRequest, InitializeResponse, ServerCapabilities, ToolsCallRequest,
        ToolsCallResponse, ToolsCapability, ToolsListRequest, ToolsListResponse,
        LATEST_PROTOCOL_VERSION, METHOD_INITIALIZE, METHOD_PING, METHOD_TOOLS_CALL,
        METHOD_TOOLS_LIST, SERVER_NAME, SUPPORTED_PROTOCOL_VERSIONS,
    },
    tools, GovernanceConfig, McpError, McpResult,
};

pub struct McpServer {
    client: CrmClient,
    governance: GovernanceConfig,
}

impl McpServer {
    pub fn new(client: CrmClient, governance: GovernanceConfig) -> Self {
        Self { client, governance }
    }

    pub fn governance(&self) -> &GovernanceConfig {
        &self.governance
    }

    /// Handle one line of input. `None` means nothing should be written back.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let value: Value = match serde_json::from_str(trimmed) {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to parse JSON-RPC message: {}", e);
                return Some(error_response(
                    None,
                    JsonRpcError::parse_error().with_data(serde_json::json!({"message": e.to_string()})),
                ));
            }
        };

        if value.is_array() {
            error!("Batch requests are not supported");
            return Some(error_response(
                None,
                JsonRpcError::invalid_request()
                    .with_data(serde_json::json!({"message": "Batch requests are not supported"})),
            ));
        }

        match self.process_message(value).await {
            Ok(response) => response,
            Err(e) => {
                error!("Error processing message: {}", e);
                Some(error_response(None, e.to_jsonrpc_error()))
            }
        }
    }

    /// Dispatch a single decoded JSON-RPC message
    pub async fn process_message(&self, message: Value) -> McpResult<Option<JsonRpcResponse>> {
        let request: JsonRpcRequest = match serde_json::from_value(message) {
            Ok(request) => request,
            Err(e) => {
                return Ok(Some(error_response(
                    None,
                    JsonRpcError::invalid_request()
                        .with_data(serde_json::json!({"message": e.to_string()})),
                )))
            }
        };

        debug!("Processing method: {}", request.method);

        if request.jsonrpc != JSONRPC_VERSION {
            return Ok(Some(error_response(
                request.id,
                JsonRpcError::invalid_request()
                    .with_data(serde_json::json!({"message": "Invalid JSON-RPC version"})),
            )));
        }

        if request.is_notification() {
            debug!("Received notification '{}', ignoring", request.method);
            return Ok(None);
        }

        let result = match request.method.as_str() {
            METHOD_INITIALIZE => self.handle_initialize(&request),
            METHOD_PING => Ok(serde_json::json!({})),
            METHOD_TOOLS_LIST => self.handle_tools_list(&request),
            METHOD_TOOLS_CALL => self.handle_tools_call(&request).await,
            _ => {
                return Ok(Some(error_response(
                    request.id,
                    JsonRpcError::method_not_found()
                        .with_data(serde_json::json!({"method": request.method})),
                )))
            }
        };

        let response = match result {
            Ok(value) => success_response(request.id, value),
            Err(e) => {
                warn!("{} failed: {}", request.method, e);
                error_response(request.id, e.to_jsonrpc_error())
            }
        };
        Ok(Some(response))
    }

    fn handle_initialize(&self, request: &JsonRpcRequest) -> McpResult<Value> {
        let params = request.params.as_ref().ok_or_else(|| {
            McpError::InvalidArguments("Missing params for initialize".to_string())
        })?;
        let init_request: InitializeRequest = serde_json::from_value(params.clone())
            .map_err(|e| McpError::InvalidArguments(e.to_string()))?;

        let protocol_version =
            if SUPPORTED_PROTOCOL_VERSIONS.contains(&init_request.protocol_version.as_str()) {
                init_request.protocol_version
            } else {
                LATEST_PROTOCOL_VERSION.to_string()
            };
        if let Some(client) = &init_request.client_info {
            info!("Client connected: {} {}", client.name, client.version);
        }

        let response = InitializeResponse {
            protocol_version,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
            },
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                title: Some("Zoho CRM".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            instructions: Some(
                "Read, create, update, delete and search Zoho CRM records".to_string(),
            ),
        };
        Ok(serde_json::to_value(response)?)
    }

    fn handle_tools_list(&self, request: &JsonRpcRequest) -> McpResult<Value> {
        let _params: ToolsListRequest = match &request.params {
            Some(params) => serde_json::from_value(params.clone())
                .map_err(|e| McpError::InvalidArguments(e.to_string()))?,
            None => ToolsListRequest::default(),
        };

        let tools = tools::catalog()
            .into_iter()
            .filter(|tool| {
                let allowed = self.governance.is_tool_allowed(&tool.name);
                if !allowed {
                    debug!("Tool '{}' filtered by governance policy", tool.name);
                }
                allowed
            })
            .collect();

        Ok(serde_json::to_value(ToolsListResponse { tools, next_cursor: None })?)
    }

    async fn handle_tools_call(&self, request: &JsonRpcRequest) -> McpResult<Value> {
        let params = request.params.as_ref().ok_or_else(|| {
            McpError::InvalidArguments("Missing params for tools/call".to_string())
        })?;
        let call_request: ToolsCallRequest = serde_json::from_value(params.clone())
            .map_err(|e| McpError::InvalidArguments(e.to_string()))?;

        let response = self.call_tool(&call_request.name, call_request.arguments).await?;
        Ok(serde_json::to_value(response)?)
    }

    /// Run one tool. CRM failures come back as an error result; only
    /// protocol problems (unknown tool, bad arguments, policy) are `Err`.
    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> McpResult<ToolsCallResponse> {
        if !self.governance.is_tool_allowed(name) {
            warn!("Tool '{}' denied by governance policy", name);
            return Err(McpError::PermissionDenied(format!(
                "Tool '{}' is not allowed by governance policy",
                name
            )));
        }

        if let Some(arguments) = &arguments {
            debug!("{}", create_debug_string(&format!("Tool {} arguments", name), arguments));
        }
        let call = ToolCall::parse(name, arguments)?;

        let _permit = self
            .governance
            .concurrency_limiter
            .acquire()
            .await
            .map_err(|_| McpError::Internal("Concurrency limiter closed".to_string()))?;

        let outcome = match timeout(self.governance.timeout, call.execute(&self.client)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("Tool '{}' timed out after {:?}", name, self.governance.timeout);
                Err(CrmError::NetworkTimeout(self.governance.timeout.as_millis() as u64))
            }
        };

        Ok(match outcome {
            Ok(value) => ToolsCallResponse::success(value),
            Err(e) => {
                warn!("Tool '{}' failed: {} ({})", name, e, e.kind());
                ToolsCallResponse::error(e.to_json())
            }
        })
    }
}

/// Serve MCP over stdin/stdout
pub async fn serve_stdio(server: McpServer) -> McpResult<()> {
    serve(Arc::new(server), BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}

/// Read newline-delimited messages from `reader` and write responses to
/// `writer`. Messages are handled concurrently; each response is written
/// as one whole line.
pub async fn serve<R, W>(server: Arc<McpServer>, reader: R, mut writer: W) -> McpResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let governance = server.governance();
    info!("Starting Zoho CRM MCP server (stdio mode)");
    info!(
        "Governance: max_concurrency={}, timeout={:?}",
        governance.max_concurrency, governance.timeout
    );
    if !governance.allow_patterns.is_empty() {
        info!("Allow patterns: {:?}", governance.allow_patterns);
    }
    if !governance.deny_patterns.is_empty() {
        info!("Deny patterns: {:?}", governance.deny_patterns);
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
    let writer_task = tokio::spawn(async move {
        while let Some(response) = rx.recv().await {
            let mut line = serde_json::to_vec(&response)?;
            line.push(b'\n');
            writer.write_all(&line).await?;
            writer.flush().await?;
        }
        Ok::<_, McpError>(())
    });

    let mut in_flight = JoinSet::new();
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        debug!("Received {}", message_summary(&line));

        let server = Arc::clone(&server);
        let tx = tx.clone();
        in_flight.spawn(async move {
            if let Some(response) = server.handle_line(&line).await {
                if tx.send(response).is_err() {
                    error!("Response writer is gone, dropping response");
                }
            }
        });

        // Reap finished tasks so the set does not grow with the session
        while in_flight.try_join_next().is_some() {}
    }

    while in_flight.join_next().await.is_some() {}
    drop(tx);
    writer_task
        .await
        .map_err(|e| McpError::Internal(format!("Response writer failed: {}", e)))??;

    info!("MCP server stopped");
    Ok(())
}

/// Method and size of an incoming line, never its params
fn message_summary(line: &str) -> String {
    let method = serde_json::from_str::<Value>(line)
        .ok()
        .and_then(|value| value.get("method").and_then(Value::as_str).map(str::to_string));
    match method {
        Some(method) => format!("'{}' ({} bytes)", method, line.len()),
        None => format!("message ({} bytes)", line.len()),
    }
}
