//! Supervised subprocess execution.
//!
//! Every external command (git, package managers, test runners) goes
//! through [`run_logged`]: stdout and stderr stream into the shared build
//! log line by line, a hard wall-clock timeout applies, and the child is
//! killed on expiry. Partial output survives a killed command because
//! lines land in the log as they arrive.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::error::AcquireError;

/// Shared, line-capped build log.
///
/// Cheap to clone; all clones append to the same ordered line buffer.
#[derive(Debug, Clone)]
pub struct BuildLog {
    lines: Arc<Mutex<Vec<String>>>,
    limit: usize,
}

impl BuildLog {
    pub fn new(limit: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(Vec::new())),
            limit: limit.max(1),
        }
    }

    /// Append one line, trimming the oldest when over the cap.
    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock().expect("build log poisoned");
        lines.push(line.into());
        if lines.len() > self.limit {
            let excess = lines.len() - self.limit;
            lines.drain(..excess);
        }
    }

    /// Ordered copy of the log so far.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.lock().expect("build log poisoned").clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().expect("build log poisoned").is_empty()
    }
}

/// One supervised command.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Shell command line, run via `sh -c`.
    pub command: String,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>, cwd: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            cwd: cwd.into(),
            env: HashMap::new(),
            timeout,
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }
}

/// Run a command, streaming its output into `log`.
///
/// Returns the exit code. A non-zero exit is not an error here; callers
/// decide what failure means. Expiry of the wall-clock timeout kills the
/// child and fails with `CommandTimeout`.
pub async fn run_logged(spec: &CommandSpec, log: &BuildLog) -> Result<i32, AcquireError> {
    log.push(format!("$ {}", spec.command));

    let mut command = Command::new("sh");
    command
        .args(["-c", &spec.command])
        .current_dir(&spec.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in &spec.env {
        command.env(key, value);
    }

    let mut child = command.spawn().map_err(|e| AcquireError::Spawn {
        command: spec.command.clone(),
        source: e,
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out_task = stream_lines(stdout, log.clone(), "");
    let err_task = stream_lines(stderr, log.clone(), "[stderr] ");

    let waited = tokio::time::timeout(spec.timeout, child.wait()).await;

    // Let the readers drain whatever the child wrote before it exited or
    // was killed.
    match waited {
        Ok(status) => {
            let status = status.map_err(AcquireError::Io)?;
            let _ = tokio::join!(out_task, err_task);
            let code = status.code().unwrap_or(-1);
            log.push(format!("(exit {code})"));
            Ok(code)
        }
        Err(_) => {
            let _ = child.kill().await;
            let _ = tokio::join!(out_task, err_task);
            log.push(format!(
                "(killed: timed out after {}s)",
                spec.timeout.as_secs()
            ));
            Err(AcquireError::CommandTimeout {
                command: spec.command.clone(),
                timeout: spec.timeout,
            })
        }
    }
}

/// Spawn a task copying lines from a child pipe into the log.
fn stream_lines<R>(
    pipe: Option<R>,
    log: BuildLog,
    prefix: &'static str,
) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(pipe) = pipe else { return };
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            log.push(format!("{prefix}{line}"));
        }
    })
}

/// Convenience: run a command and require exit code zero.
pub async fn run_checked(spec: &CommandSpec, log: &BuildLog) -> Result<(), AcquireError> {
    let code = run_logged(spec, log).await?;
    if code != 0 {
        return Err(AcquireError::BuildFailed {
            command: spec.command.clone(),
            status: code,
        });
    }
    Ok(())
}

/// Helper for callers that only need a working directory check.
pub fn dir_exists(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}
