//! MCP (Model Context Protocol) server over stdio.
//!
//! Speaks newline-delimited JSON-RPC 2.0: one request per line on stdin,
//! one response per line on stdout. Notifications (requests without an
//! `id`) are handled but never answered. Requests are processed one at a
//! time in arrival order.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::tools::ToolRegistry;

/// MCP protocol version
pub const PROTOCOL_VERSION: &str = "2024-11-05";
/// Server name reported on initialize
pub const SERVER_NAME: &str = "phpunit-mate";
/// Server version (from cargo)
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

// JSON-RPC 2.0 error codes
const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }

    /// The result payload, if the request succeeded.
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// The error code, if the request failed.
    pub fn error_code(&self) -> Option<i32> {
        self.error.as_ref().map(|e| e.code)
    }
}

#[derive(Debug, Serialize)]
struct ToolCallResult {
    content: Vec<TextContent>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    is_error: Option<bool>,
}

#[derive(Debug, Serialize)]
struct TextContent {
    #[serde(rename = "type")]
    content_type: &'static str,
    text: String,
}

impl ToolCallResult {
    fn text(text: String) -> Self {
        Self {
            content: vec![TextContent {
                content_type: "text",
                text,
            }],
            is_error: None,
        }
    }

    fn error(message: String) -> Self {
        Self {
            is_error: Some(true),
            ..Self::text(message)
        }
    }
}

/// Serves a [`ToolRegistry`] over MCP.
pub struct McpServer {
    registry: ToolRegistry,
}

impl McpServer {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// Serves on stdin/stdout until stdin closes.
    pub async fn serve_stdio(&self) -> anyhow::Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serves requests read from `reader`, writing responses to `writer`,
    /// until `reader` reaches end of input.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!(
            "MCP server {} v{} ready (protocol {})",
            SERVER_NAME,
            SERVER_VERSION,
            PROTOCOL_VERSION
        );

        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            tracing::debug!("<- {}", line);

            let Some(response) = self.handle_line(&line).await else {
                continue;
            };

            let response_json = serde_json::to_string(&response)?;
            tracing::debug!("-> {}", response_json);

            writer.write_all(response_json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }

        tracing::info!("MCP server shutting down");
        Ok(())
    }

    /// Handles one line of input. Returns `None` for notifications.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ));
            }
        };

        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                return Some(JsonRpcResponse::error(
                    Value::Null,
                    INVALID_REQUEST,
                    format!("Invalid request: {}", e),
                ));
            }
        };

        let Some(id) = request.id.clone() else {
            self.handle_notification(&request);
            return None;
        };

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                "Invalid JSON-RPC version",
            ));
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, request.params).await,
            "resources/list" => self.handle_resources_list(id),
            "resources/read" => self.handle_resources_read(id, &request.params),
            method => JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", method),
            ),
        };
        Some(response)
    }

    fn handle_notification(&self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/initialized" | "initialized" => {
                tracing::info!("Client initialized");
            }
            method => tracing::debug!("Ignoring notification {}", method),
        }
    }

    fn handle_initialize(&self, id: Value) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": { "listChanged": false },
                    "resources": { "subscribe": false, "listChanged": false }
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": SERVER_VERSION
                }
            }),
        )
    }

    fn handle_tools_list(&self, id: Value) -> JsonRpcResponse {
        let tools: Vec<_> = self.registry.definitions().collect();
        JsonRpcResponse::success(id, json!({ "tools": tools }))
    }

    async fn handle_tools_call(&self, id: Value, params: Value) -> JsonRpcResponse {
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing required parameter: name");
        };

        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        match self.registry.call(name, arguments).await {
            Ok(text) => to_response(id, ToolCallResult::text(text)),
            Err(e) if e.is_invalid_request() => {
                JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string())
            }
            Err(e) => {
                tracing::warn!("Tool {} failed: {}", name, e);
                to_response(id, ToolCallResult::error(e.to_string()))
            }
        }
    }

    fn handle_resources_list(&self, id: Value) -> JsonRpcResponse {
        JsonRpcResponse::success(id, json!({ "resources": self.registry.resources() }))
    }

    fn handle_resources_read(&self, id: Value, params: &Value) -> JsonRpcResponse {
        let Some(uri) = params.get("uri").and_then(Value::as_str) else {
            return JsonRpcResponse::error(id, INVALID_PARAMS, "Missing required parameter: uri");
        };

        match self.registry.read_resource(uri) {
            Ok(content) => JsonRpcResponse::success(id, json!({ "contents": [content] })),
            Err(e) if e.is_invalid_request() => {
                JsonRpcResponse::error(id, INVALID_PARAMS, e.to_string())
            }
            Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, e.to_string()),
        }
    }
}

fn to_response(id: Value, result: impl Serialize) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(
            id,
            INTERNAL_ERROR,
            format!("Failed to serialize result: {}", e),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::tools::tests::{FAILING_REPORT, FakeExecutor, toolbox};

    fn server(root: &std::path::Path) -> McpServer {
        let executor = Arc::new(FakeExecutor::new(Some(FAILING_REPORT), 1));
        McpServer::new(ToolRegistry::new(toolbox(root, executor)))
    }

    async fn call(server: &McpServer, request: Value) -> Value {
        let response = server.handle_line(&request.to_string()).await.unwrap();
        serde_json::to_value(response).unwrap()
    }

    #[tokio::test]
    async fn test_initialize() {
        let temp_dir = TempDir::new().unwrap();
        let response = call(
            &server(temp_dir.path()),
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        )
        .await;

        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(response["result"]["serverInfo"]["name"], "phpunit-mate");
        assert!(response.get("error").is_none());
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let temp_dir = TempDir::new().unwrap();
        let server = server(temp_dir.path());

        let line = json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string();
        assert!(server.handle_line(&line).await.is_none());
    }

    #[tokio::test]
    async fn test_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let response = server(temp_dir.path()).handle_line("{not json").await.unwrap();

        assert_eq!(response.error_code(), Some(PARSE_ERROR));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_invalid_request() {
        let temp_dir = TempDir::new().unwrap();
        let server = server(temp_dir.path());

        let response = server.handle_line(r#"{"jsonrpc": "2.0", "id": 3}"#).await.unwrap();
        assert_eq!(response.error_code(), Some(INVALID_REQUEST));

        let response = server
            .handle_line(r#"{"jsonrpc": "1.0", "id": 3, "method": "ping"}"#)
            .await
            .unwrap();
        assert_eq!(response.error_code(), Some(INVALID_REQUEST));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let temp_dir = TempDir::new().unwrap();
        let response = call(
            &server(temp_dir.path()),
            json!({"jsonrpc": "2.0", "id": "a", "method": "prompts/list"}),
        )
        .await;

        assert_eq!(response["id"], "a");
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tools_list() {
        let temp_dir = TempDir::new().unwrap();
        let response = call(
            &server(temp_dir.path()),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        )
        .await;

        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 4);
        assert_eq!(tools[0]["name"], "phpunit-run-suite");
        assert!(tools[0].get("inputSchema").is_some());
    }

    #[tokio::test]
    async fn test_tools_call() {
        let temp_dir = TempDir::new().unwrap();
        let response = call(
            &server(temp_dir.path()),
            json!({
                "jsonrpc": "2.0",
                "id": 4,
                "method": "tools/call",
                "params": {"name": "phpunit-run-suite", "arguments": {"mode": "by-class"}}
            }),
        )
        .await;

        let result = &response["result"];
        assert_eq!(result["content"][0]["type"], "text");
        assert!(result["content"][0]["text"].as_str().unwrap().contains("by_class"));
        assert!(result.get("isError").is_none());
    }

    #[tokio::test]
    async fn test_tools_call_invalid_params() {
        let temp_dir = TempDir::new().unwrap();
        let server = server(temp_dir.path());

        let response = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call", "params": {"name": "phpunit-run-file"}}),
        )
        .await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
        assert_eq!(
            response["error"]["message"],
            "The \"file\" parameter is required for phpunit-run-file tool."
        );

        let response = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 6, "method": "tools/call", "params": {"name": "nope"}}),
        )
        .await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);

        let response = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call", "params": {}}),
        )
        .await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_tools_call_failure_is_tool_error() {
        let temp_dir = TempDir::new().unwrap();
        let executor = Arc::new(FakeExecutor::new(None, 255));
        let server = McpServer::new(ToolRegistry::new(toolbox(temp_dir.path(), executor)));

        let response = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 8, "method": "tools/call", "params": {"name": "phpunit-run-suite"}}),
        )
        .await;

        assert_eq!(response["result"]["isError"], true);
        assert_eq!(
            response["result"]["content"][0]["text"],
            "Empty JUnit XML provided"
        );
    }

    #[tokio::test]
    async fn test_resources() {
        let temp_dir = TempDir::new().unwrap();
        let server = server(temp_dir.path());

        let response = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 9, "method": "resources/list"}),
        )
        .await;
        assert_eq!(response["result"]["resources"][0]["uri"], "phpunit://config");
        assert_eq!(response["result"]["resources"][0]["mimeType"], "text/plain");

        let response = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 10, "method": "resources/read", "params": {"uri": "phpunit://config"}}),
        )
        .await;
        let contents = &response["result"]["contents"][0];
        assert_eq!(contents["uri"], "phpunit://config");
        assert!(contents["text"].as_str().unwrap().contains("config_exists: false"));

        let response = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 11, "method": "resources/read", "params": {"uri": "phpunit://other"}}),
        )
        .await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_serve_writes_one_line_per_response() {
        let temp_dir = TempDir::new().unwrap();
        let server = server(temp_dir.path());

        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n",
        );
        let mut output = Vec::new();

        server.serve(input.as_bytes(), &mut output).await.unwrap();

        let output = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["id"], 1);
        assert_eq!(first["result"], json!({}));
        let second: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["id"], 2);
    }
}
