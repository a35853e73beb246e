//! MCP protocol client and smoke test runner.

pub mod protocol;
pub mod smoke;
pub mod stdio;
pub mod synth;

pub use protocol::{CallToolResult, ContentBlock, McpRequest, McpResponse, McpTool};
pub use smoke::{ProbeOutcome, SmokeReport, SmokeRequest, SmokeRunner, ToolProbe};
pub use stdio::{McpConnector, McpTransport, StdioConnector, StdioTransport};
pub use synth::synthesize_args;
