//! Repository acquisition and build pipeline.
//!
//! `clone_and_build` takes a repo from URL to built working tree inside
//! the workspace root. Git and every build tool run through the
//! supervised subprocess, so the build log survives failures and
//! timeouts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{BuildConfig, WorkspaceConfig};
use crate::error::AcquireError;
use crate::forge::ecosystem::{self, Ecosystem};
use crate::forge::process::{BuildLog, CommandSpec, dir_exists, run_checked, run_logged};

/// Request for one acquisition run.
#[derive(Debug, Clone)]
pub struct AcquireRequest {
    pub repo_url: String,
    /// Project name; derived from the URL when absent.
    pub name: Option<String>,
    pub branch: Option<String>,
    /// Explicit build commands, run verbatim instead of auto-detection.
    pub build_commands: Vec<String>,
    pub env: HashMap<String, String>,
    /// Update an already-acquired project instead of skipping it.
    pub pull_if_exists: bool,
}

/// An acquired, built project. Immutable after the build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectHandle {
    pub repo_url: String,
    pub local_path: PathBuf,
    pub ecosystem: Ecosystem,
    pub build_log: Vec<String>,
}

/// Structured result of `clone_and_build`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneBuildReport {
    pub success: bool,
    pub project: Option<ProjectHandle>,
    /// True when no ecosystem was recognized and no explicit commands
    /// were given; the build is skipped, not failed.
    pub build_skipped: bool,
    pub build_log: Vec<String>,
    pub error: Option<String>,
}

/// Clone (or update) a repository and build it.
pub async fn clone_and_build(
    workspace: &WorkspaceConfig,
    build: &BuildConfig,
    req: &AcquireRequest,
) -> CloneBuildReport {
    let log = BuildLog::new(build.log_limit);
    let name = req
        .name
        .clone()
        .unwrap_or_else(|| derive_name(&req.repo_url));
    let local_path = workspace.root.join(&name);

    match run(workspace, build, req, &name, &local_path, &log).await {
        Ok((ecosystem, build_skipped)) => CloneBuildReport {
            success: true,
            project: Some(ProjectHandle {
                repo_url: req.repo_url.clone(),
                local_path,
                ecosystem,
                build_log: log.snapshot(),
            }),
            build_skipped,
            build_log: log.snapshot(),
            error: None,
        },
        Err(err) => {
            tracing::warn!(repo = %req.repo_url, error = %err, "acquisition failed");
            CloneBuildReport {
                success: false,
                project: None,
                build_skipped: false,
                build_log: log.snapshot(),
                error: Some(err.to_string()),
            }
        }
    }
}

async fn run(
    workspace: &WorkspaceConfig,
    build: &BuildConfig,
    req: &AcquireRequest,
    name: &str,
    local_path: &Path,
    log: &BuildLog,
) -> Result<(Ecosystem, bool), AcquireError> {
    std::fs::create_dir_all(&workspace.root)?;

    if dir_exists(local_path) {
        if req.pull_if_exists {
            update_checkout(req, local_path, build, log).await?;
        } else {
            tracing::info!(project = name, "already acquired, skipping clone");
            log.push(format!("{name} already present, clone skipped"));
        }
    } else {
        clone_fresh(req, &workspace.root, name, build, log).await?;
    }

    // Explicit commands run verbatim; otherwise fall back to what the
    // ecosystem conventionally does.
    let ecosystem = ecosystem::detect(local_path);
    if !req.build_commands.is_empty() {
        for command in &req.build_commands {
            let spec = CommandSpec::new(command, local_path, build.command_timeout)
                .with_env(req.env.clone());
            run_checked(&spec, log).await?;
        }
        return Ok((ecosystem, false));
    }

    match ecosystem {
        Ecosystem::Unknown => {
            tracing::info!(project = name, "unrecognized ecosystem, build skipped");
            log.push("unrecognized ecosystem: no marker files found, build skipped".to_string());
            Ok((ecosystem, true))
        }
        eco => {
            if let Some(install) = ecosystem::install_command(eco, local_path) {
                let spec = CommandSpec::new(&install, local_path, build.command_timeout)
                    .with_env(req.env.clone());
                run_checked(&spec, log).await?;
            }
            if let Some(build_cmd) = ecosystem::build_command(eco, local_path) {
                let spec = CommandSpec::new(&build_cmd, local_path, build.command_timeout)
                    .with_env(req.env.clone());
                run_checked(&spec, log).await?;
            }
            Ok((eco, false))
        }
    }
}

async fn clone_fresh(
    req: &AcquireRequest,
    workspace_root: &Path,
    name: &str,
    build: &BuildConfig,
    log: &BuildLog,
) -> Result<(), AcquireError> {
    let branch_arg = req
        .branch
        .as_deref()
        .map(|b| format!("--branch {} ", shell_quote(b)))
        .unwrap_or_default();
    let command = format!(
        "git clone {branch_arg}{} {}",
        shell_quote(&req.repo_url),
        shell_quote(name)
    );

    let spec =
        CommandSpec::new(&command, workspace_root, build.command_timeout).with_env(req.env.clone());
    // Whatever goes wrong here (spawn, timeout, nonzero exit) is a clone
    // failure to callers.
    match run_logged(&spec, log).await {
        Ok(0) => Ok(()),
        Ok(code) => Err(AcquireError::CloneFailed {
            url: req.repo_url.clone(),
            reason: format!("git clone exited with status {code}"),
        }),
        Err(err) => Err(AcquireError::CloneFailed {
            url: req.repo_url.clone(),
            reason: err.to_string(),
        }),
    }
}

async fn update_checkout(
    req: &AcquireRequest,
    local_path: &Path,
    build: &BuildConfig,
    log: &BuildLog,
) -> Result<(), AcquireError> {
    let mut commands = vec!["git fetch --all --prune".to_string()];
    if let Some(branch) = &req.branch {
        commands.push(format!("git checkout {}", shell_quote(branch)));
    }
    commands.push("git pull --ff-only".to_string());

    for command in commands {
        let spec = CommandSpec::new(&command, local_path, build.command_timeout)
            .with_env(req.env.clone());
        match run_logged(&spec, log).await {
            Ok(0) => {}
            Ok(code) => {
                return Err(AcquireError::CloneFailed {
                    url: req.repo_url.clone(),
                    reason: format!("`{command}` exited with status {code}"),
                });
            }
            Err(err) => {
                return Err(AcquireError::CloneFailed {
                    url: req.repo_url.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Derive a filesystem-safe project name from a repository URL.
pub fn derive_name(repo_url: &str) -> String {
    let trimmed = repo_url.trim_end_matches('/');
    let last = trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(trimmed)
        .trim_end_matches(".git");

    let name: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();

    if name.is_empty() {
        "project".to_string()
    } else {
        name
    }
}

/// Quote one shell argument (single quotes, POSIX style).
fn shell_quote(arg: &str) -> String {
    if arg
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:@".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
