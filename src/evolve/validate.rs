//! Post-modification validation pipeline.
//!
//! Cheap static checks over recently changed (or explicitly named) files,
//! plus an optional run of the project's test command. Every check runs
//! independently and tolerantly: a finding in one file never stops the
//! others from being checked.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::config::{BuildConfig, ValidationConfig};
use crate::evolve::sources::{detect_language, resolve_targets};
use crate::forge::process::{BuildLog, CommandSpec, run_logged};

/// The static checks the pipeline can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    Syntax,
    Semantic,
    SecurityPattern,
    PerformancePattern,
    Functional,
}

/// Request for one validation run.
#[derive(Debug, Clone)]
pub struct ValidateRequest {
    /// Explicit targets; recently modified files when absent.
    pub file_paths: Option<Vec<PathBuf>>,
    pub kinds: Vec<ValidationKind>,
    pub run_tests: bool,
}

/// One problem found by a check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckFinding {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of one check across all target files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub kind: ValidationKind,
    pub passed: bool,
    pub findings: Vec<CheckFinding>,
}

/// Outcome of the test command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRun {
    pub passed: bool,
    pub exit_code: i32,
    pub log_tail: Vec<String>,
}

/// Structured result of `validate_changes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub success: bool,
    pub files_checked: usize,
    pub checks: Vec<CheckOutcome>,
    pub tests: Option<TestRun>,
    pub error: Option<String>,
}

/// Context shared by one validation run.
pub struct Validator<'a> {
    pub validation: &'a ValidationConfig,
    pub build: &'a BuildConfig,
    pub source_roots: &'a [PathBuf],
    pub max_files: usize,
}

impl Validator<'_> {
    /// Run the requested checks and optionally the test suite.
    pub async fn validate_changes(&self, req: &ValidateRequest) -> ValidationReport {
        let targets = match &req.file_paths {
            Some(paths) => resolve_targets(Some(paths), &[], self.max_files),
            None => self.recently_modified(),
        };

        if targets.is_empty() && !req.run_tests {
            return ValidationReport {
                success: false,
                files_checked: 0,
                checks: Vec::new(),
                tests: None,
                error: Some("no files to validate".to_string()),
            };
        }

        let checks = req
            .kinds
            .iter()
            .map(|kind| run_check(*kind, &targets))
            .collect();

        let tests = if req.run_tests {
            Some(self.run_tests().await)
        } else {
            None
        };

        ValidationReport {
            success: true,
            files_checked: targets.len(),
            checks,
            tests,
            error: None,
        }
    }

    /// Files under the source roots modified within the recent window.
    fn recently_modified(&self) -> Vec<PathBuf> {
        let cutoff = SystemTime::now()
            .checked_sub(self.validation.recent_window)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        resolve_targets(None, self.source_roots, self.max_files)
            .into_iter()
            .filter(|path| {
                std::fs::metadata(path)
                    .and_then(|m| m.modified())
                    .map(|mtime| mtime >= cutoff)
                    .unwrap_or(false)
            })
            .collect()
    }

    async fn run_tests(&self) -> TestRun {
        let log = BuildLog::new(self.build.log_limit);
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let spec = CommandSpec::new(
            &self.validation.test_command,
            cwd,
            self.validation.test_timeout,
        );

        match run_logged(&spec, &log).await {
            Ok(code) => TestRun {
                passed: code == 0,
                exit_code: code,
                log_tail: tail(log.snapshot(), 50),
            },
            Err(err) => {
                tracing::warn!(error = %err, "test command failed to run");
                TestRun {
                    passed: false,
                    exit_code: -1,
                    log_tail: tail(log.snapshot(), 50),
                }
            }
        }
    }
}

fn tail(mut lines: Vec<String>, keep: usize) -> Vec<String> {
    if lines.len() > keep {
        lines.drain(..lines.len() - keep);
    }
    lines
}

/// Run one check across the target files; unreadable files count as
/// findings, not failures of the run.
fn run_check(kind: ValidationKind, targets: &[PathBuf]) -> CheckOutcome {
    let mut findings = Vec::new();

    for path in targets {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                findings.push(CheckFinding {
                    path: path.clone(),
                    message: format!("unreadable: {e}"),
                });
                continue;
            }
        };

        let messages = match kind {
            ValidationKind::Syntax => check_syntax(&content),
            ValidationKind::Semantic => check_semantic(&content),
            ValidationKind::SecurityPattern => check_security(&content),
            ValidationKind::PerformancePattern => check_performance(&content),
            ValidationKind::Functional => check_functional(path, &content),
        };
        findings.extend(messages.into_iter().map(|message| CheckFinding {
            path: path.clone(),
            message,
        }));
    }

    CheckOutcome {
        kind,
        passed: findings.is_empty(),
        findings,
    }
}

/// Delimiter balance, ignoring string literals and line comments.
fn check_syntax(content: &str) -> Vec<String> {
    let mut messages = Vec::new();
    if content.trim().is_empty() {
        return vec!["file is empty".to_string()];
    }

    let mut depth_paren = 0i64;
    let mut depth_brace = 0i64;
    let mut depth_bracket = 0i64;

    for line in content.lines() {
        let mut in_string = false;
        let mut prev = '\0';
        let mut chars = line.chars().peekable();

        while let Some(c) = chars.next() {
            if in_string {
                if c == '"' && prev != '\\' {
                    in_string = false;
                }
            } else {
                match c {
                    '"' => in_string = true,
                    // Char literals ('{', '\n') are consumed whole;
                    // lifetimes ('a) have no closing quote and pass.
                    '\'' => {
                        let mut look = chars.clone();
                        match (look.next(), look.next()) {
                            (Some('\\'), _) => {
                                chars.next();
                                for c2 in chars.by_ref() {
                                    if c2 == '\'' {
                                        break;
                                    }
                                }
                            }
                            (Some(_), Some('\'')) => {
                                chars.next();
                                chars.next();
                            }
                            _ => {}
                        }
                    }
                    '/' if chars.peek() == Some(&'/') => break,
                    '#' => break,
                    '(' => depth_paren += 1,
                    ')' => depth_paren -= 1,
                    '{' => depth_brace += 1,
                    '}' => depth_brace -= 1,
                    '[' => depth_bracket += 1,
                    ']' => depth_bracket -= 1,
                    _ => {}
                }
            }
            prev = c;
        }
    }

    if depth_paren != 0 {
        messages.push(format!("unbalanced parentheses (depth {depth_paren})"));
    }
    if depth_brace != 0 {
        messages.push(format!("unbalanced braces (depth {depth_brace})"));
    }
    if depth_bracket != 0 {
        messages.push(format!("unbalanced brackets (depth {depth_bracket})"));
    }
    messages
}

fn check_semantic(content: &str) -> Vec<String> {
    let mut messages = Vec::new();
    for marker in ["<<<<<<<", ">>>>>>>", "======="] {
        if content.lines().any(|l| l.starts_with(marker)) {
            messages.push(format!("unresolved merge conflict marker `{marker}`"));
            break;
        }
    }
    if content.contains("FIXME") {
        messages.push("FIXME marker present".to_string());
    }
    messages
}

fn check_security(content: &str) -> Vec<String> {
    const PATTERNS: &[(&str, &str)] = &[
        ("eval(", "dynamic code evaluation"),
        ("exec(", "dynamic code execution"),
        ("os.system(", "shell execution from string"),
        ("child_process", "subprocess from untrusted input"),
        ("api_key = \"", "hard-coded credential"),
        ("password = \"", "hard-coded credential"),
    ];

    PATTERNS
        .iter()
        .filter(|(pattern, _)| content.contains(pattern))
        .map(|(pattern, reason)| format!("`{pattern}`: {reason}"))
        .collect()
}

fn check_performance(content: &str) -> Vec<String> {
    const PATTERNS: &[(&str, &str)] = &[
        (".clone().clone()", "double clone"),
        ("readFileSync", "blocking IO in async runtime"),
        (".collect::<Vec<_>>().len()", "collect only to count"),
        (".unwrap().clone().unwrap()", "chained unwrap/clone"),
    ];

    PATTERNS
        .iter()
        .filter(|(pattern, _)| content.contains(pattern))
        .map(|(pattern, reason)| format!("`{pattern}`: {reason}"))
        .collect()
}

/// Structured files must still parse; code files must still define
/// something callable.
fn check_functional(path: &Path, content: &str) -> Vec<String> {
    match detect_language(path) {
        "json" => match serde_json::from_str::<serde_json::Value>(content) {
            Ok(_) => vec![],
            Err(e) => vec![format!("JSON no longer parses: {e}")],
        },
        "rust" | "python" | "typescript" | "javascript" => {
            const DEFINITIONS: &[&str] = &["fn ", "def ", "function ", "=>", "const ", "class "];
            if DEFINITIONS.iter().any(|d| content.contains(d)) {
                vec![]
            } else {
                vec!["no function or type definitions remain".to_string()]
            }
        }
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn configs() -> (ValidationConfig, BuildConfig) {
        (
            ValidationConfig {
                test_command: "echo test-suite-ok".to_string(),
                test_timeout: Duration::from_secs(10),
                recent_window: Duration::from_secs(3600),
            },
            BuildConfig {
                command_timeout: Duration::from_secs(10),
                log_limit: 500,
            },
        )
    }

    #[test]
    fn syntax_check_flags_unbalanced_braces() {
        assert!(check_syntax("fn broken() {\n").iter().any(|m| m.contains("braces")));
        assert!(check_syntax("fn ok() { let x = (1); }\n").is_empty());
    }

    #[test]
    fn syntax_check_ignores_strings_and_comments() {
        assert!(check_syntax(r#"let s = "{ not a brace";"#).is_empty());
        assert!(check_syntax("let x = 1; // unmatched {{{\n").is_empty());
        assert!(check_syntax("# python comment with {{{\n x = 1").is_empty());
    }

    #[test]
    fn syntax_check_handles_lifetimes_and_char_literals() {
        assert!(check_syntax("fn f<'a>(x: &'a str) -> &'a str { x }\n").is_empty());
        assert!(check_syntax("let open = '{';\nlet close = '}';\n let nl = '\\n';").is_empty());
    }

    #[test]
    fn semantic_check_flags_conflict_markers() {
        let content = "fn a() {}\n<<<<<<< HEAD\nfn b() {}\n";
        assert!(!check_semantic(content).is_empty());
        assert!(check_semantic("fn clean() {}").is_empty());
    }

    #[test]
    fn security_check_flags_eval() {
        assert!(!check_security("result = eval(user_input)").is_empty());
        assert!(check_security("let evaluation = 1;").is_empty());
    }

    #[test]
    fn performance_check_flags_double_clone() {
        assert!(!check_performance("x.clone().clone()").is_empty());
        assert!(check_performance("x.clone()").is_empty());
    }

    #[test]
    fn functional_check_parses_json() {
        let bad = check_functional(Path::new("config.json"), "{broken");
        assert!(!bad.is_empty());
        let good = check_functional(Path::new("config.json"), r#"{"ok": true}"#);
        assert!(good.is_empty());
    }

    #[tokio::test]
    async fn checks_run_independently_over_targets() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.rs");
        let bad = dir.path().join("bad.rs");
        std::fs::write(&good, "fn fine() {}\n").unwrap();
        std::fs::write(&bad, "fn broken() {\n eval(\n").unwrap();

        let (validation, build) = configs();
        let validator = Validator {
            validation: &validation,
            build: &build,
            source_roots: &[],
            max_files: 50,
        };

        let report = validator
            .validate_changes(&ValidateRequest {
                file_paths: Some(vec![good, bad.clone()]),
                kinds: vec![
                    ValidationKind::Syntax,
                    ValidationKind::SecurityPattern,
                    ValidationKind::Functional,
                ],
                run_tests: false,
            })
            .await;

        assert!(report.success);
        assert_eq!(report.files_checked, 2);
        assert_eq!(report.checks.len(), 3);

        let syntax = report
            .checks
            .iter()
            .find(|c| c.kind == ValidationKind::Syntax)
            .unwrap();
        assert!(!syntax.passed);
        assert!(syntax.findings.iter().all(|f| f.path == bad));

        let functional = report
            .checks
            .iter()
            .find(|c| c.kind == ValidationKind::Functional)
            .unwrap();
        assert!(functional.passed);
    }

    #[tokio::test]
    async fn test_command_reports_pass() {
        let (validation, build) = configs();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.rs");
        std::fs::write(&file, "fn a() {}").unwrap();

        let validator = Validator {
            validation: &validation,
            build: &build,
            source_roots: &[],
            max_files: 50,
        };

        let report = validator
            .validate_changes(&ValidateRequest {
                file_paths: Some(vec![file]),
                kinds: vec![],
                run_tests: true,
            })
            .await;

        let tests = report.tests.unwrap();
        assert!(tests.passed);
        assert_eq!(tests.exit_code, 0);
        assert!(tests.log_tail.iter().any(|l| l.contains("test-suite-ok")));
    }

    #[tokio::test]
    async fn failing_test_command_reports_failure() {
        let (mut validation, build) = configs();
        validation.test_command = "exit 4".to_string();
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.rs");
        std::fs::write(&file, "fn a() {}").unwrap();

        let validator = Validator {
            validation: &validation,
            build: &build,
            source_roots: &[],
            max_files: 50,
        };

        let report = validator
            .validate_changes(&ValidateRequest {
                file_paths: Some(vec![file]),
                kinds: vec![],
                run_tests: true,
            })
            .await;

        let tests = report.tests.unwrap();
        assert!(!tests.passed);
        assert_eq!(tests.exit_code, 4);
    }

    #[tokio::test]
    async fn recent_mtime_heuristic_finds_fresh_files() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = dir.path().join("fresh.rs");
        std::fs::write(&fresh, "fn f() {}").unwrap();

        let (validation, build) = configs();
        let roots = [dir.path().to_path_buf()];
        let validator = Validator {
            validation: &validation,
            build: &build,
            source_roots: &roots,
            max_files: 50,
        };

        let report = validator
            .validate_changes(&ValidateRequest {
                file_paths: None,
                kinds: vec![ValidationKind::Syntax],
                run_tests: false,
            })
            .await;

        assert!(report.success);
        assert_eq!(report.files_checked, 1);
    }
}
