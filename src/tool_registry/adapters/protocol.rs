//! MCP JSON-RPC 2.0 wire types shared by the stdio and HTTP drivers.

use crate::tool_registry::{
    domain::{McpToolDefinition, ToolCallOutcome},
    ports::{McpDriverError, McpDriverResult},
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// MCP protocol revision requested during initialization.
pub(crate) const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC "method not found" error code.
pub(crate) const METHOD_NOT_FOUND: i64 = -32601;

/// Outgoing JSON-RPC request.
#[derive(Debug, Serialize)]
pub(crate) struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl<'a> JsonRpcRequest<'a> {
    pub(crate) const fn new(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// Outgoing JSON-RPC notification.
#[derive(Debug, Serialize)]
pub(crate) struct JsonRpcNotification<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
}

impl<'a> JsonRpcNotification<'a> {
    pub(crate) const fn new(method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

/// Any incoming JSON-RPC message: a response to one of our requests, or a
/// request or notification initiated by the server.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct JsonRpcMessage {
    #[serde(default)]
    pub(crate) id: Option<Value>,
    #[serde(default)]
    pub(crate) method: Option<String>,
    #[serde(default)]
    pub(crate) result: Option<Value>,
    #[serde(default)]
    pub(crate) error: Option<JsonRpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct JsonRpcError {
    pub(crate) code: i64,
    pub(crate) message: String,
}

impl JsonRpcMessage {
    /// Returns the numeric id of a response, if this is one.
    pub(crate) fn response_id(&self) -> Option<u64> {
        if self.method.is_some() {
            return None;
        }
        self.id.as_ref().and_then(Value::as_u64)
    }

    /// Converts a response into its result payload.
    pub(crate) fn into_result(self) -> McpDriverResult<Value> {
        if let Some(error) = self.error {
            return Err(McpDriverError::Remote {
                code: error.code,
                message: error.message,
            });
        }
        self.result.ok_or_else(|| {
            McpDriverError::Protocol(String::from("response carries neither result nor error"))
        })
    }
}

/// Builds the response to a request initiated by the server.
///
/// Only `ping` is answered; everything else is declined.
pub(crate) fn reply_to_server_request(id: &Value, method: &str) -> Value {
    if method == "ping" {
        json!({ "jsonrpc": "2.0", "id": id, "result": {} })
    } else {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": METHOD_NOT_FOUND, "message": format!("method '{method}' not supported") },
        })
    }
}

/// Parameters of the `initialize` request.
pub(crate) fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// Result of the `initialize` request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InitializeResult {
    pub(crate) protocol_version: String,
    #[serde(default)]
    pub(crate) capabilities: ServerCapabilities,
    #[serde(default)]
    pub(crate) server_info: Option<ServerInfo>,
}

/// Capabilities advertised by the server.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ServerCapabilities {
    #[serde(default)]
    pub(crate) tools: Option<Value>,
    #[serde(default)]
    pub(crate) resources: Option<Value>,
}

/// Server identification from the `initialize` result.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServerInfo {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) version: String,
}

/// One page of `tools/list`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ToolsPage {
    #[serde(default)]
    pub(crate) tools: Vec<WireTool>,
    #[serde(default)]
    pub(crate) next_cursor: Option<String>,
}

/// Tool entry as sent by the server.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireTool {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "default_input_schema")]
    input_schema: Value,
}

fn default_input_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

impl TryFrom<WireTool> for McpToolDefinition {
    type Error = McpDriverError;

    fn try_from(tool: WireTool) -> Result<Self, Self::Error> {
        Self::new(tool.name, tool.description.unwrap_or_default(), tool.input_schema)
            .map_err(|err| McpDriverError::Protocol(format!("invalid tool entry: {err}")))
    }
}

/// One page of `resources/list`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResourcesPage {
    #[serde(default)]
    pub(crate) resources: Vec<WireResource>,
    #[serde(default)]
    pub(crate) next_cursor: Option<String>,
}

/// Resource entry as sent by the server.
#[derive(Debug, Deserialize)]
pub(crate) struct WireResource {
    pub(crate) uri: String,
}

/// Result of `tools/call`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireCallResult {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(default)]
    is_error: bool,
}

impl From<WireCallResult> for ToolCallOutcome {
    fn from(result: WireCallResult) -> Self {
        Self {
            content: result.content,
            is_error: result.is_error,
        }
    }
}

/// Decodes a result payload, reporting malformed payloads as protocol
/// errors.
pub(crate) fn decode<T: DeserializeOwned>(method: &str, value: Value) -> McpDriverResult<T> {
    serde_json::from_value(value)
        .map_err(|err| McpDriverError::Protocol(format!("malformed {method} result: {err}")))
}
