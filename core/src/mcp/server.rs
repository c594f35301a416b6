/// MCP server over stdio
///
/// Reads line-delimited JSON-RPC 2.0 messages, answers lifecycle and listing
/// requests inline, and runs each `tools/call` as its own task so a long
/// utterance never blocks `ping` or cancellation. All responses funnel through
/// one writer task; stdout is never written from anywhere else.
use super::types::*;
use crate::tools::ToolRegistry;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

pub struct McpServer {
    registry: ToolRegistry,
    info: ServerInfo,
    instructions: Option<String>,
    /// In-flight tools/call tasks keyed by the JSON text of their request id
    in_flight: DashMap<String, AbortHandle>,
}

impl McpServer {
    pub fn new(registry: ToolRegistry, info: ServerInfo) -> Self {
        Self {
            registry,
            info,
            instructions: None,
            in_flight: DashMap::new(),
        }
    }

    /// Instructions returned to the client in the initialize result
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Number of tool calls currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Serve on the process's stdin/stdout until stdin closes
    pub async fn serve_stdio(self: Arc<Self>) -> Result<(), McpError> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve on arbitrary streams until the reader reaches EOF.
    ///
    /// EOF means the client went away: every in-flight call is aborted.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> Result<(), McpError>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        info!(
            target: "mcp_server",
            server = %self.info.name,
            version = %self.info.version,
            tools = self.registry.len(),
            "MCP server listening on stdio"
        );

        let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
        let writer_task = tokio::spawn(write_loop(writer, rx));

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            self.handle_line(&line, &tx);
        }

        info!(target: "mcp_server", "Input closed; cancelling in-flight calls");
        self.cancel_all();
        drop(tx);

        writer_task
            .await
            .map_err(|e| McpError::Transport(format!("Writer task failed: {}", e)))?
    }

    fn handle_line(self: &Arc<Self>, line: &str, tx: &mpsc::UnboundedSender<JsonRpcResponse>) {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "mcp_server", error = %e, "Failed to parse JSON-RPC message");
                let _ = tx.send(JsonRpcResponse::failure(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
                return;
            }
        };

        // Responses to server-initiated requests; we never send any
        if value.get("method").is_none()
            && (value.get("result").is_some() || value.get("error").is_some())
        {
            debug!(target: "mcp_server", "Ignoring JSON-RPC response from client");
            return;
        }

        let request: JsonRpcRequest = match serde_json::from_value(value.clone()) {
            Ok(r) => r,
            Err(e) => {
                let id = value.get("id").cloned().unwrap_or(Value::Null);
                let _ = tx.send(JsonRpcResponse::failure(
                    id,
                    INVALID_REQUEST,
                    format!("Invalid request: {}", e),
                ));
                return;
            }
        };

        match request.id.clone() {
            None => self.handle_notification(&request),
            Some(id) => self.handle_request(id, request, tx),
        }
    }

    fn handle_notification(&self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/initialized" => {
                debug!(target: "mcp_server", "Client initialized");
            }
            "notifications/cancelled" => {
                let params = request
                    .params
                    .clone()
                    .and_then(|p| serde_json::from_value::<CancelledParams>(p).ok());
                match params {
                    Some(p) => self.cancel(&p.request_id, p.reason.as_deref()),
                    None => warn!(target: "mcp_server", "Malformed cancellation notification"),
                }
            }
            other => {
                debug!(target: "mcp_server", method = %other, "Ignoring notification");
            }
        }
    }

    fn handle_request(
        self: &Arc<Self>,
        id: Value,
        request: JsonRpcRequest,
        tx: &mpsc::UnboundedSender<JsonRpcResponse>,
    ) {
        debug!(target: "mcp_server", method = %request.method, id = %id, "Request");

        let result = match request.method.as_str() {
            "initialize" => self.initialize(request.params),
            "ping" => Ok(json!({})),
            "tools/list" => self.list_tools(),
            "tools/call" => {
                if let Err(e) = self.spawn_call(id.clone(), request.params, tx) {
                    let _ = tx.send(JsonRpcResponse::failure(id, e.rpc_code(), e.to_string()));
                }
                return;
            }
            other => Err(McpError::MethodNotFound(other.to_string())),
        };

        let response = match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => {
                warn!(target: "mcp_server", code = e.code(), error = %e, "Request failed");
                JsonRpcResponse::failure(id, e.rpc_code(), e.to_string())
            }
        };
        let _ = tx.send(response);
    }

    fn initialize(&self, params: Option<Value>) -> Result<Value, McpError> {
        let params: InitializeParams = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(|e| McpError::InvalidParams(format!("initialize: {}", e)))?;

        let version = negotiate_protocol_version(&params.protocol_version);
        info!(
            target: "mcp_server",
            client = %params.client_info.name,
            client_version = %params.client_info.version,
            requested = %params.protocol_version,
            negotiated = %version,
            "Client connected"
        );

        let result = InitializeResult {
            protocol_version: version.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
                experimental: None,
            },
            server_info: self.info.clone(),
            instructions: self.instructions.clone(),
        };
        Ok(serde_json::to_value(result)?)
    }

    fn list_tools(&self) -> Result<Value, McpError> {
        let tools = self
            .registry
            .list_tools()
            .into_iter()
            .map(|t| McpTool {
                name: t.name(),
                description: Some(t.description()),
                input_schema: t.parameters(),
            })
            .collect();
        Ok(serde_json::to_value(ListToolsResult {
            tools,
            next_cursor: None,
        })?)
    }

    fn spawn_call(
        self: &Arc<Self>,
        id: Value,
        params: Option<Value>,
        tx: &mpsc::UnboundedSender<JsonRpcResponse>,
    ) -> Result<(), McpError> {
        let params: CallToolParams = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(|e| McpError::InvalidParams(format!("tools/call: {}", e)))?;

        if self.registry.get(&params.name).is_none() {
            return Err(McpError::InvalidParams(format!("Unknown tool: {}", params.name)));
        }

        let key = id.to_string();
        if self.in_flight.contains_key(&key) {
            return Err(McpError::Protocol(format!("Duplicate request id: {}", key)));
        }

        let server = Arc::clone(self);
        let tx = tx.clone();
        let task_key = key.clone();
        // The task waits until its abort handle is registered
        let (registered_tx, registered_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = registered_rx.await;
            let arguments = params.arguments.unwrap_or_else(|| json!({}));
            let body = match server.registry.call(&params.name, arguments).await {
                Ok(text) => CallToolResult::text(text),
                Err(e) => CallToolResult::error(format!("Error: {}", e)),
            };
            server.in_flight.remove(&task_key);

            let response = match serde_json::to_value(body) {
                Ok(v) => JsonRpcResponse::success(id, v),
                Err(e) => JsonRpcResponse::failure(id, INTERNAL_ERROR, e.to_string()),
            };
            let _ = tx.send(response);
        });

        self.in_flight.insert(key, handle.abort_handle());
        let _ = registered_tx.send(());
        Ok(())
    }

    /// Abort an in-flight call. The aborted call sends no response.
    fn cancel(&self, request_id: &Value, reason: Option<&str>) {
        let key = request_id.to_string();
        match self.in_flight.remove(&key) {
            Some((_, handle)) => {
                info!(
                    target: "mcp_server",
                    id = %key,
                    reason = reason.unwrap_or(""),
                    "Cancelling tool call"
                );
                handle.abort();
            }
            None => {
                debug!(target: "mcp_server", id = %key, "Cancellation for unknown or finished request");
            }
        }
    }

    fn cancel_all(&self) {
        let keys: Vec<String> = self.in_flight.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, handle)) = self.in_flight.remove(&key) {
                handle.abort();
            }
        }
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>) -> Result<(), McpError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_string(&response)?;
        line.push('\n');

        writer.write_all(line.as_bytes()).await.map_err(|e| {
            error!(target: "mcp_server", error = %e, "Failed to write response");
            McpError::Io(e)
        })?;
        writer.flush().await?;
    }
    Ok(())
}
