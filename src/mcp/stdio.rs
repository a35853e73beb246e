//! Stdio MCP transport.
//!
//! Launches a server from its [`ServerDefinition`] and speaks
//! newline-delimited JSON-RPC over the child's stdin/stdout. The session
//! itself stays an opaque collaborator behind the [`McpTransport`] and
//! [`McpConnector`] traits so the smoke runner can be driven by fakes.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::error::SmokeError;
use crate::mcp::protocol::{
    CallToolResult, InitializeResult, ListToolsResult, McpRequest, McpResponse, McpTool,
};
use crate::registry::ServerDefinition;

/// Protocol client over one live server session.
#[async_trait]
pub trait McpTransport: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<McpTool>, SmokeError>;
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, SmokeError>;
    async fn close(&self);
}

/// Opens transports for server definitions.
#[async_trait]
pub trait McpConnector: Send + Sync {
    async fn connect(&self, def: &ServerDefinition) -> Result<Box<dyn McpTransport>, SmokeError>;
}

/// Connector spawning the server as a child process.
pub struct StdioConnector {
    /// Timeout for the initialize handshake and each protocol round-trip.
    pub request_timeout: Duration,
}

impl StdioConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl McpConnector for StdioConnector {
    async fn connect(&self, def: &ServerDefinition) -> Result<Box<dyn McpTransport>, SmokeError> {
        let transport = StdioTransport::spawn(def, self.request_timeout).await?;
        Ok(Box::new(transport))
    }
}

struct TransportIo {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// JSON-RPC over a child process's stdio.
pub struct StdioTransport {
    io: tokio::sync::Mutex<TransportIo>,
    next_id: AtomicU64,
    request_timeout: Duration,
}

impl StdioTransport {
    /// Spawn the server process and run the initialize handshake.
    pub async fn spawn(
        def: &ServerDefinition,
        request_timeout: Duration,
    ) -> Result<Self, SmokeError> {
        let mut command = Command::new(&def.command);
        command
            .args(&def.args)
            .current_dir(&def.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &def.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| {
            SmokeError::Transport(format!("failed to spawn `{}`: {e}", def.command))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SmokeError::Transport("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| SmokeError::Transport("child stdout unavailable".to_string()))?;

        let transport = Self {
            io: tokio::sync::Mutex::new(TransportIo {
                child,
                stdin,
                stdout,
            }),
            next_id: AtomicU64::new(1),
            request_timeout,
        };

        transport.initialize().await?;
        Ok(transport)
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn initialize(&self) -> Result<InitializeResult, SmokeError> {
        let id = self.next_request_id();
        let response = self.request(McpRequest::initialize(id)).await?;
        let result = expect_result(response)?;
        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| SmokeError::Protocol(format!("invalid initialize result: {e}")))?;

        // Notifications have no response; best effort.
        let _ = self.send(&McpRequest::initialized_notification()).await;
        Ok(init)
    }

    async fn send(&self, request: &McpRequest) -> Result<(), SmokeError> {
        let mut line = serde_json::to_string(request)
            .map_err(|e| SmokeError::Protocol(format!("request serialization failed: {e}")))?;
        line.push('\n');

        let mut io = self.io.lock().await;
        io.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| SmokeError::Transport(format!("stdin write failed: {e}")))?;
        io.stdin
            .flush()
            .await
            .map_err(|e| SmokeError::Transport(format!("stdin flush failed: {e}")))?;
        Ok(())
    }

    /// Send a request and read lines until its response arrives.
    ///
    /// Server-initiated notifications and unrelated ids are skipped.
    async fn request(&self, request: McpRequest) -> Result<McpResponse, SmokeError> {
        let want_id = request.id;
        self.send(&request).await?;

        let deadline = self.request_timeout;
        tokio::time::timeout(deadline, async {
            let mut io = self.io.lock().await;
            let mut line = String::new();
            loop {
                line.clear();
                let read = io
                    .stdout
                    .read_line(&mut line)
                    .await
                    .map_err(|e| SmokeError::Transport(format!("stdout read failed: {e}")))?;
                if read == 0 {
                    return Err(SmokeError::Transport(
                        "server closed its stdout".to_string(),
                    ));
                }

                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str::<McpResponse>(trimmed) {
                    Ok(response) if response.id == want_id => return Ok(response),
                    Ok(_) => continue,
                    Err(_) => {
                        tracing::debug!(line = trimmed, "skipping non-response output");
                        continue;
                    }
                }
            }
        })
        .await
        .map_err(|_| SmokeError::CallTimeout(deadline))?
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn list_tools(&self) -> Result<Vec<McpTool>, SmokeError> {
        let id = self.next_request_id();
        let response = self.request(McpRequest::list_tools(id)).await?;
        let result = expect_result(response)?;
        let listed: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| SmokeError::Protocol(format!("invalid tools list: {e}")))?;
        Ok(listed.tools)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, SmokeError> {
        let id = self.next_request_id();
        let response = self
            .request(McpRequest::call_tool(id, name, arguments))
            .await?;
        let result = expect_result(response)?;
        serde_json::from_value(result)
            .map_err(|e| SmokeError::Protocol(format!("invalid tool result: {e}")))
    }

    async fn close(&self) {
        let mut io = self.io.lock().await;
        let _ = io.stdin.shutdown().await;
        if let Err(e) = io.child.kill().await {
            tracing::debug!(error = %e, "server process already gone");
        }
        let _ = io.child.wait().await;
    }
}

fn expect_result(response: McpResponse) -> Result<Value, SmokeError> {
    if let Some(error) = response.error {
        return Err(SmokeError::Protocol(format!(
            "{} (code {})",
            error.message, error.code
        )));
    }
    response
        .result
        .ok_or_else(|| SmokeError::Protocol("response carried no result".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_maps_to_protocol_error() {
        let response: McpResponse = serde_json::from_str(
            r#"{"jsonrpc": "2.0", "id": 1,
                "error": {"code": -32601, "message": "method not found"}}"#,
        )
        .unwrap();
        let err = expect_result(response).unwrap_err();
        match err {
            SmokeError::Protocol(message) => {
                assert!(message.contains("method not found"));
                assert!(message.contains("-32601"));
            }
            other => panic!("expected Protocol, got: {other:?}"),
        }
    }

    #[test]
    fn missing_result_is_a_protocol_error() {
        let response: McpResponse =
            serde_json::from_str(r#"{"jsonrpc": "2.0", "id": 1}"#).unwrap();
        assert!(expect_result(response).is_err());
    }

    #[test]
    fn result_passes_through() {
        let response: McpResponse =
            serde_json::from_str(r#"{"jsonrpc": "2.0", "id": 1, "result": {"tools": []}}"#)
                .unwrap();
        let value = expect_result(response).unwrap();
        assert!(value["tools"].as_array().unwrap().is_empty());
    }
}
