//! CLI command handling.
//!
//! One subcommand per hub operation:
//! - Provisioning: `acquire`, `register`, `smoke`
//! - Self-maintenance: `analyze`, `improve`, `validate`, `rollback`
//! - Consensus: `ensemble`
//! - Diagnostics: `providers`
//!
//! Every command prints its structured report as JSON so the hub's
//! dashboard (and scripts) can consume the output directly.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::evolve::analyze::AnalyzeRequest;
use crate::evolve::backup::RollbackRequest;
use crate::evolve::improve::ImproveRequest;
use crate::evolve::validate::{ValidateRequest, ValidationKind};
use crate::forge::acquire::AcquireRequest;
use crate::forge::register::RegisterRequest;
use crate::hub::Hub;
use crate::llm::analysis::{AnalysisKind, AnalysisRequest, ImprovementKind, SafetyLevel};
use crate::mcp::smoke::SmokeRequest;

#[derive(Parser, Debug)]
#[command(name = "forgehub")]
#[command(about = "Provision MCP tool-servers from source repositories and supervise \
                   LLM-driven maintenance of the hub's own codebase")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Clone (or update) a repository and build it in the workspace
    Acquire {
        /// Repository URL to clone
        repo_url: String,

        /// Project name (derived from the URL when omitted)
        #[arg(long)]
        name: Option<String>,

        /// Branch to check out
        #[arg(long)]
        branch: Option<String>,

        /// Explicit build command, run verbatim (repeatable, in order)
        #[arg(long = "build-command")]
        build_commands: Vec<String>,

        /// Extra environment for build commands, KEY=VALUE (repeatable)
        #[arg(long = "env")]
        env: Vec<String>,

        /// Fetch and pull when the project already exists
        #[arg(long)]
        pull: bool,
    },

    /// Register a built project as a tool-server
    Register {
        /// Unique server name
        name: String,

        /// Launch command
        #[arg(long)]
        command: String,

        /// Launch arguments (repeatable, in order)
        #[arg(long = "arg")]
        args: Vec<String>,

        /// Working directory, resolved against the workspace root
        #[arg(long)]
        working_dir: PathBuf,

        /// Server environment, KEY=VALUE (repeatable)
        #[arg(long = "env")]
        env: Vec<String>,

        /// Register the server disabled
        #[arg(long)]
        disabled: bool,
    },

    /// Exercise every declared tool on a registered server
    Smoke {
        /// Server to test
        server: String,

        /// Only exercise these tools (repeatable)
        #[arg(long = "tool")]
        tools: Vec<String>,

        /// Supplied arguments as JSON: {"tool": {...}, ...}
        #[arg(long)]
        args: Option<String>,

        /// Per-tool call timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Critique the hub's own source files
    Analyze {
        /// What to look for
        #[arg(long, value_enum, default_value = "code-quality")]
        kind: AnalysisKind,

        /// Explicit target files (repeatable; source roots walked when omitted)
        #[arg(long = "file")]
        files: Vec<PathBuf>,

        /// Ask several adapters and merge their findings
        #[arg(long)]
        ensemble: bool,

        /// Minimum successful adapters in ensemble mode
        #[arg(long, default_value_t = 2)]
        min_providers: usize,
    },

    /// Rewrite the hub's own source files under the safety guards
    Improve {
        /// What to improve
        #[arg(long, value_enum, default_value = "comprehensive")]
        kind: ImprovementKind,

        /// Explicit target files (repeatable)
        #[arg(long = "file")]
        files: Vec<PathBuf>,

        /// How conservative applied rewrites must be
        #[arg(long, value_enum, default_value = "conservative")]
        safety: SafetyLevel,

        /// Propose without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Run static checks and optionally the test suite
    Validate {
        /// Explicit target files (repeatable; recent changes when omitted)
        #[arg(long = "file")]
        files: Vec<PathBuf>,

        /// Checks to run (repeatable; all when omitted)
        #[arg(long = "check", value_enum)]
        checks: Vec<ValidationKind>,

        /// Also run the configured test command
        #[arg(long)]
        run_tests: bool,
    },

    /// Restore files from a snapshot
    Rollback {
        /// Snapshot id (latest when omitted)
        #[arg(long)]
        snapshot: Option<String>,

        /// Restore only these files (repeatable)
        #[arg(long = "file")]
        files: Vec<PathBuf>,

        /// Actually do it; without this the command refuses
        #[arg(long)]
        confirm: bool,
    },

    /// Consensus analysis of one file across several adapters
    Ensemble {
        /// File to analyze
        file: PathBuf,

        /// What to look for
        #[arg(long, value_enum, default_value = "code-quality")]
        kind: AnalysisKind,

        /// Minimum successful adapters
        #[arg(long, default_value_t = 2)]
        min_providers: usize,
    },

    /// Show configured AI providers and probe their availability
    Providers,
}

/// Execute one CLI command against the hub.
pub async fn run_command(hub: &Hub, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Acquire {
            repo_url,
            name,
            branch,
            build_commands,
            env,
            pull,
        } => {
            let report = hub
                .clone_and_build(&AcquireRequest {
                    repo_url,
                    name,
                    branch,
                    build_commands,
                    env: parse_env(&env)?,
                    pull_if_exists: pull,
                })
                .await;
            print_report(&report)
        }

        Command::Register {
            name,
            command,
            args,
            working_dir,
            env,
            disabled,
        } => {
            let report = hub
                .register_server(&RegisterRequest {
                    name,
                    command,
                    args,
                    working_dir,
                    env: parse_env(&env)?,
                    enabled: !disabled,
                })
                .await;
            print_report(&report)
        }

        Command::Smoke {
            server,
            tools,
            args,
            timeout_secs,
        } => {
            let args_overrides = match args {
                Some(raw) => serde_json::from_str::<HashMap<String, serde_json::Value>>(&raw)
                    .map_err(|e| anyhow::anyhow!("--args is not a JSON object of objects: {e}"))?,
                None => HashMap::new(),
            };
            let report = hub
                .smoke_run(&SmokeRequest {
                    server_name: server,
                    tool_filter: if tools.is_empty() { None } else { Some(tools) },
                    args_overrides,
                    timeout: timeout_secs.map(Duration::from_secs),
                })
                .await;
            print_report(&report)
        }

        Command::Analyze {
            kind,
            files,
            ensemble,
            min_providers,
        } => {
            let report = hub
                .analyze_self(&AnalyzeRequest {
                    kind,
                    target_files: if files.is_empty() { None } else { Some(files) },
                    ensemble,
                    min_providers,
                })
                .await;
            print_report(&report)
        }

        Command::Improve {
            kind,
            files,
            safety,
            dry_run,
        } => {
            let report = hub
                .improve_codebase(&ImproveRequest {
                    kind,
                    target_files: if files.is_empty() { None } else { Some(files) },
                    safety,
                    dry_run,
                })
                .await;
            print_report(&report)
        }

        Command::Validate {
            files,
            checks,
            run_tests,
        } => {
            let kinds = if checks.is_empty() {
                vec![
                    ValidationKind::Syntax,
                    ValidationKind::Semantic,
                    ValidationKind::SecurityPattern,
                    ValidationKind::PerformancePattern,
                    ValidationKind::Functional,
                ]
            } else {
                checks
            };
            let report = hub
                .validate_changes(&ValidateRequest {
                    file_paths: if files.is_empty() { None } else { Some(files) },
                    kinds,
                    run_tests,
                })
                .await;
            print_report(&report)
        }

        Command::Rollback {
            snapshot,
            files,
            confirm,
        } => {
            let report = hub
                .rollback_modifications(&RollbackRequest {
                    snapshot_id: snapshot,
                    file_paths: if files.is_empty() { None } else { Some(files) },
                    confirm,
                })
                .await;
            print_report(&report)
        }

        Command::Ensemble {
            file,
            kind,
            min_providers,
        } => {
            let content = std::fs::read_to_string(&file)
                .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", file.display()))?;
            let request = AnalysisRequest {
                relative_path: file.display().to_string(),
                language: crate::evolve::sources::detect_language(&file).to_string(),
                app_context: crate::evolve::analyze::APP_CONTEXT.to_string(),
                content,
                kind,
            };
            let report = hub.ensemble_analysis(&request, min_providers).await;
            print_report(&report)
        }

        Command::Providers => {
            let status = hub.provider_status().await;
            if status.is_empty() {
                println!("no providers configured");
                return Ok(());
            }
            for (name, available) in status {
                let mark = if available { "ok" } else { "unavailable" };
                println!("{name:<12} {mark}");
            }
            Ok(())
        }
    }
}

fn print_report<T: Serialize>(report: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// Parse repeated KEY=VALUE flags into a map.
fn parse_env(pairs: &[String]) -> anyhow::Result<HashMap<String, String>> {
    let mut env = HashMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("--env expects KEY=VALUE, got '{pair}'"))?;
        env.insert(key.to_string(), value.to_string());
    }
    Ok(env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_pairs_parse() {
        let env = parse_env(&["A=1".to_string(), "B=two=parts".to_string()]).unwrap();
        assert_eq!(env["A"], "1");
        assert_eq!(env["B"], "two=parts");
    }

    #[test]
    fn env_without_equals_is_rejected() {
        assert!(parse_env(&["JUSTAKEY".to_string()]).is_err());
    }

    #[test]
    fn cli_parses_acquire() {
        let cli = Cli::try_parse_from([
            "forgehub",
            "acquire",
            "https://github.com/acme/widget.git",
            "--name",
            "widget",
            "--build-command",
            "npm install",
            "--build-command",
            "npm run build",
            "--pull",
        ])
        .unwrap();

        match cli.command {
            Command::Acquire {
                repo_url,
                name,
                build_commands,
                pull,
                ..
            } => {
                assert_eq!(repo_url, "https://github.com/acme/widget.git");
                assert_eq!(name.as_deref(), Some("widget"));
                assert_eq!(build_commands.len(), 2);
                assert!(pull);
            }
            other => panic!("parsed wrong command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_rollback_confirm() {
        let cli = Cli::try_parse_from(["forgehub", "rollback", "--confirm"]).unwrap();
        match cli.command {
            Command::Rollback { confirm, snapshot, .. } => {
                assert!(confirm);
                assert!(snapshot.is_none());
            }
            other => panic!("parsed wrong command: {other:?}"),
        }
    }
}
