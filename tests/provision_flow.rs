//! End-to-end provisioning flow: acquire a minimal project, register it
//! as a server, and smoke test its declared tools.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use forgehub::config::{
    BuildConfig, Config, EvolveConfig, ProvidersConfig, SmokeConfig, ValidationConfig,
    WorkspaceConfig,
};
use forgehub::error::SmokeError;
use forgehub::forge::acquire::AcquireRequest;
use forgehub::forge::register::RegisterRequest;
use forgehub::hub::Hub;
use forgehub::mcp::protocol::{CallToolResult, McpTool};
use forgehub::mcp::smoke::SmokeRequest;
use forgehub::mcp::stdio::{McpConnector, McpTransport, StdioConnector};
use forgehub::registry::{JsonRegistry, ServerDefinition, ServerRegistry};

fn test_config(root: &Path) -> Config {
    Config {
        providers: ProvidersConfig::default(),
        workspace: WorkspaceConfig {
            root: root.join("workspace"),
            backup_root: root.join("backups"),
            registry_path: root.join("servers.json"),
        },
        build: BuildConfig {
            command_timeout: Duration::from_secs(30),
            log_limit: 1000,
        },
        smoke: SmokeConfig {
            call_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
        },
        evolve: EvolveConfig {
            apply_threshold: 0.7,
            max_files_per_run: 10,
            max_walk_files: 100,
            source_roots: vec![PathBuf::from("src")],
            safe_dirs: vec![PathBuf::from("src")],
        },
        validation: ValidationConfig {
            test_command: "echo ok".to_string(),
            test_timeout: Duration::from_secs(30),
            recent_window: Duration::from_secs(1800),
        },
    }
}

/// Drop a stub `npm` on PATH so the conventional Node steps run without
/// a real toolchain; it echoes its invocation, which is what the build
/// log assertions need.
fn stub_npm(root: &Path) -> (PathBuf, String) {
    let bin = root.join("stub-bin");
    std::fs::create_dir_all(&bin).unwrap();
    let npm = bin.join("npm");
    std::fs::write(&npm, "#!/bin/sh\necho \"npm $@\"\n").unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&npm, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let path = format!(
        "{}:{}",
        bin.display(),
        std::env::var("PATH").unwrap_or_default()
    );
    (bin, path)
}

/// In-memory transport declaring one zero-argument tool.
struct OneToolTransport;

#[async_trait]
impl McpTransport for OneToolTransport {
    async fn list_tools(&self) -> Result<Vec<McpTool>, SmokeError> {
        Ok(vec![McpTool {
            name: "ping".to_string(),
            description: "answers pong".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        }])
    }

    async fn call_tool(
        &self,
        _name: &str,
        _arguments: serde_json::Value,
    ) -> Result<CallToolResult, SmokeError> {
        Ok(serde_json::from_value(json!({
            "content": [{"type": "text", "text": "pong"}],
            "isError": false
        }))
        .unwrap())
    }

    async fn close(&self) {}
}

struct OneToolConnector;

#[async_trait]
impl McpConnector for OneToolConnector {
    async fn connect(
        &self,
        _def: &ServerDefinition,
    ) -> Result<Box<dyn McpTransport>, SmokeError> {
        Ok(Box::new(OneToolTransport))
    }
}

#[tokio::test]
async fn acquire_register_smoke_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let registry: Arc<dyn ServerRegistry> =
        Arc::new(JsonRegistry::new(&config.workspace.registry_path));
    let hub = Hub::with_collaborators(config.clone(), Arc::clone(&registry), Arc::new(OneToolConnector));

    // A minimal already-present project: one dependency, one build script.
    let project = config.workspace.root.join("widget");
    std::fs::create_dir_all(&project).unwrap();
    std::fs::write(
        project.join("package.json"),
        r#"{"name": "widget",
            "dependencies": {"left-pad": "^1.3.0"},
            "scripts": {"build": "node build.js"}}"#,
    )
    .unwrap();

    let (_bin, path) = stub_npm(dir.path());
    let mut env = HashMap::new();
    env.insert("PATH".to_string(), path);

    // Acquire: clone skipped (already present), conventional steps run.
    let acquired = hub
        .clone_and_build(&AcquireRequest {
            repo_url: "https://github.com/acme/widget.git".to_string(),
            name: None,
            branch: None,
            build_commands: vec![],
            env,
            pull_if_exists: false,
        })
        .await;

    assert!(acquired.success, "acquire failed: {acquired:?}");
    let log = &acquired.build_log;
    let install_idx = log
        .iter()
        .position(|l| l == "npm install")
        .unwrap_or_else(|| panic!("no install line in {log:?}"));
    let build_idx = log
        .iter()
        .position(|l| l == "npm run build")
        .unwrap_or_else(|| panic!("no build line in {log:?}"));
    assert!(install_idx < build_idx);

    // Register with a trivial stdio command.
    let registered = hub
        .register_server(&RegisterRequest {
            name: "widget".to_string(),
            command: "cat".to_string(),
            args: vec![],
            working_dir: PathBuf::from("widget"),
            env: HashMap::new(),
            enabled: true,
        })
        .await;
    assert!(registered.success, "register failed: {registered:?}");

    // Smoke: one zero-argument tool, all green.
    let smoked = hub
        .smoke_run(&SmokeRequest {
            server_name: "widget".to_string(),
            tool_filter: None,
            args_overrides: HashMap::new(),
            timeout: None,
        })
        .await;

    assert!(smoked.success, "smoke failed: {smoked:?}");
    assert_eq!(smoked.total_tools, 1);
    assert_eq!(smoked.success_count, 1);
    assert_eq!(smoked.failure_count, 0);
    assert_eq!(smoked.probes[0].synthetic_args, json!({}));
}

#[tokio::test]
async fn failed_clone_never_creates_a_server_definition() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let registry: Arc<dyn ServerRegistry> =
        Arc::new(JsonRegistry::new(&config.workspace.registry_path));
    let hub = Hub::with_collaborators(config, Arc::clone(&registry), Arc::new(OneToolConnector));

    let report = hub
        .clone_and_build(&AcquireRequest {
            repo_url: "https://invalid.invalid/acme/missing.git".to_string(),
            name: None,
            branch: None,
            build_commands: vec![],
            env: HashMap::new(),
            pull_if_exists: false,
        })
        .await;

    assert!(!report.success);
    assert!(report.project.is_none());
    assert!(registry.load().await.unwrap().servers.is_empty());
}

/// The same smoke flow over a real stdio child process. Skipped quietly
/// when python3 is not installed.
#[tokio::test]
async fn stdio_smoke_against_child_process() {
    if std::process::Command::new("python3")
        .arg("--version")
        .output()
        .is_err()
    {
        eprintln!("python3 not available, skipping stdio transport test");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let server_script = dir.path().join("stub_server.py");
    std::fs::write(
        &server_script,
        r#"
import sys, json

for line in sys.stdin:
    line = line.strip()
    if not line:
        continue
    req = json.loads(line)
    method = req.get("method")
    req_id = req.get("id")
    if method == "initialize":
        result = {"protocolVersion": "2024-11-05", "capabilities": {},
                  "serverInfo": {"name": "stub", "version": "0.0.1"}}
    elif method == "tools/list":
        result = {"tools": [{"name": "ping", "description": "pong",
                             "inputSchema": {"type": "object", "properties": {}}}]}
    elif method == "tools/call":
        result = {"content": [{"type": "text", "text": "pong"}], "isError": False}
    else:
        continue
    sys.stdout.write(json.dumps({"jsonrpc": "2.0", "id": req_id, "result": result}) + "\n")
    sys.stdout.flush()
"#,
    )
    .unwrap();

    let config = test_config(dir.path());
    let registry: Arc<dyn ServerRegistry> =
        Arc::new(JsonRegistry::new(&config.workspace.registry_path));
    std::fs::create_dir_all(config.workspace.root.join("stub")).unwrap();

    let hub = Hub::with_collaborators(
        config.clone(),
        Arc::clone(&registry),
        Arc::new(StdioConnector::new(config.smoke.connect_timeout)),
    );

    let registered = hub
        .register_server(&RegisterRequest {
            name: "stub".to_string(),
            command: "python3".to_string(),
            args: vec![server_script.display().to_string()],
            working_dir: PathBuf::from("stub"),
            env: HashMap::new(),
            enabled: true,
        })
        .await;
    assert!(registered.success, "register failed: {registered:?}");

    let smoked = hub
        .smoke_run(&SmokeRequest {
            server_name: "stub".to_string(),
            tool_filter: None,
            args_overrides: HashMap::new(),
            timeout: None,
        })
        .await;

    assert!(smoked.success, "smoke failed: {smoked:?}");
    assert_eq!(smoked.total_tools, 1);
    assert_eq!(smoked.success_count, 1);
}
