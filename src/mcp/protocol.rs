//! MCP JSON-RPC protocol types.
//!
//! Only the slice of the protocol the smoke runner needs: initialize,
//! tools/list, and tools/call over newline-delimited JSON-RPC 2.0.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// A JSON-RPC request or notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    /// Absent for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl McpRequest {
    fn new(id: Option<u64>, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }

    pub fn initialize(id: u64) -> Self {
        Self::new(
            Some(id),
            "initialize",
            Some(serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": "forgehub",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            })),
        )
    }

    pub fn initialized_notification() -> Self {
        Self::new(None, "notifications/initialized", None)
    }

    pub fn list_tools(id: u64) -> Self {
        Self::new(Some(id), "tools/list", None)
    }

    pub fn call_tool(id: u64, name: &str, arguments: Value) -> Self {
        Self::new(
            Some(id),
            "tools/call",
            Some(serde_json::json!({
                "name": name,
                "arguments": arguments,
            })),
        )
    }
}

/// A JSON-RPC response.
#[derive(Debug, Clone, Deserialize)]
pub struct McpResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<McpErrorObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct McpErrorObject {
    pub code: i64,
    pub message: String,
}

/// Result of `initialize`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion", default)]
    pub protocol_version: Option<String>,
}

/// A tool declared by a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// Result of `tools/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<McpTool>,
}

/// Result of `tools/call`.
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

/// One content block in a tool result.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type", default)]
    pub block_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl ContentBlock {
    pub fn as_text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

impl CallToolResult {
    /// Concatenated text content.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| block.as_text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
