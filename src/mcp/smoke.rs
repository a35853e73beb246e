//! Smoke test runner.
//!
//! Connects to a freshly registered server and exercises every declared
//! tool once. One tool's failure never aborts the run; the report carries
//! a per-tool outcome either way.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::SmokeConfig;
use crate::error::SmokeError;
use crate::mcp::stdio::{McpConnector, McpTransport};
use crate::mcp::synth::synthesize_args;
use crate::registry::ServerRegistry;

/// Request for one smoke run.
#[derive(Debug, Clone, Default)]
pub struct SmokeRequest {
    pub server_name: String,
    /// Exercise only these tools when given.
    pub tool_filter: Option<Vec<String>>,
    /// Supplied arguments per tool name; synthesized when absent.
    pub args_overrides: HashMap<String, Value>,
    /// Per-tool call timeout override.
    pub timeout: Option<Duration>,
}

/// Outcome of probing one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ProbeOutcome {
    Ok,
    Error { message: String },
}

/// One exercised tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolProbe {
    pub tool_name: String,
    pub synthetic_args: Value,
    #[serde(flatten)]
    pub outcome: ProbeOutcome,
    pub latency: Duration,
}

impl ToolProbe {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, ProbeOutcome::Ok)
    }
}

/// Structured result of `smoke_run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmokeReport {
    pub success: bool,
    pub run_id: uuid::Uuid,
    pub server: String,
    pub total_tools: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub probes: Vec<ToolProbe>,
    pub error: Option<String>,
}

impl SmokeReport {
    fn failed(server: &str, err: &SmokeError) -> Self {
        Self {
            success: false,
            run_id: uuid::Uuid::new_v4(),
            server: server.to_string(),
            total_tools: 0,
            success_count: 0,
            failure_count: 0,
            probes: Vec::new(),
            error: Some(err.to_string()),
        }
    }
}

/// Runs smoke tests against registered servers.
pub struct SmokeRunner {
    registry: Arc<dyn ServerRegistry>,
    connector: Arc<dyn McpConnector>,
    config: SmokeConfig,
}

impl SmokeRunner {
    pub fn new(
        registry: Arc<dyn ServerRegistry>,
        connector: Arc<dyn McpConnector>,
        config: SmokeConfig,
    ) -> Self {
        Self {
            registry,
            connector,
            config,
        }
    }

    /// Exercise every declared tool on the named server.
    pub async fn smoke_run(&self, req: &SmokeRequest) -> SmokeReport {
        let transport = match self.connect(&req.server_name).await {
            Ok(t) => t,
            Err(err) => {
                tracing::warn!(server = %req.server_name, error = %err, "smoke run aborted");
                return SmokeReport::failed(&req.server_name, &err);
            }
        };

        let report = self.probe_all(transport.as_ref(), req).await;
        // The connection is closed whatever happened above.
        transport.close().await;
        report
    }

    async fn connect(&self, server_name: &str) -> Result<Box<dyn McpTransport>, SmokeError> {
        let settings = self
            .registry
            .load()
            .await
            .map_err(|e| SmokeError::Transport(format!("registry load failed: {e}")))?;

        let definition =
            settings
                .servers
                .get(server_name)
                .ok_or_else(|| SmokeError::ServerNotFound {
                    name: server_name.to_string(),
                })?;

        if !definition.enabled {
            return Err(SmokeError::ServerDisabled {
                name: server_name.to_string(),
            });
        }

        self.connector.connect(definition).await
    }

    async fn probe_all(&self, transport: &dyn McpTransport, req: &SmokeRequest) -> SmokeReport {
        let tools = match transport.list_tools().await {
            Ok(tools) => tools,
            Err(err) => return SmokeReport::failed(&req.server_name, &err),
        };

        let selected: Vec<_> = match &req.tool_filter {
            Some(filter) => tools
                .into_iter()
                .filter(|t| filter.iter().any(|f| f == &t.name))
                .collect(),
            None => tools,
        };

        let timeout = req.timeout.unwrap_or(self.config.call_timeout);
        let mut probes = Vec::with_capacity(selected.len());

        for tool in &selected {
            let args = req
                .args_overrides
                .get(&tool.name)
                .cloned()
                .unwrap_or_else(|| synthesize_args(&tool.input_schema));

            let start = std::time::Instant::now();
            let outcome =
                match tokio::time::timeout(timeout, transport.call_tool(&tool.name, args.clone()))
                    .await
                {
                    Ok(Ok(result)) if result.is_error => ProbeOutcome::Error {
                        message: result.text(),
                    },
                    Ok(Ok(_)) => ProbeOutcome::Ok,
                    Ok(Err(err)) => ProbeOutcome::Error {
                        message: err.to_string(),
                    },
                    Err(_) => ProbeOutcome::Error {
                        message: SmokeError::CallTimeout(timeout).to_string(),
                    },
                };
            let latency = start.elapsed();

            tracing::debug!(
                tool = %tool.name,
                ok = matches!(outcome, ProbeOutcome::Ok),
                latency = ?latency,
                "tool probed"
            );
            probes.push(ToolProbe {
                tool_name: tool.name.clone(),
                synthetic_args: args,
                outcome,
                latency,
            });
        }

        let success_count = probes.iter().filter(|p| p.succeeded()).count();
        let failure_count = probes.len() - success_count;

        SmokeReport {
            success: true,
            run_id: uuid::Uuid::new_v4(),
            server: req.server_name.clone(),
            total_tools: probes.len(),
            success_count,
            failure_count,
            probes,
            error: None,
        }
    }
}
