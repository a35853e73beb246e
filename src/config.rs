//! Configuration for forgehub.
//!
//! Settings are loaded with priority: env var > default. `FORGEHUB_*`
//! variables may live in `./.env` (loaded via dotenvy early in startup).
//! Tuning constants that the original system hard-coded (apply-confidence
//! threshold, per-run file cap) are deliberately configuration here.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Main configuration for the hub.
#[derive(Debug, Clone)]
pub struct Config {
    pub providers: ProvidersConfig,
    pub workspace: WorkspaceConfig,
    pub build: BuildConfig,
    pub smoke: SmokeConfig,
    pub evolve: EvolveConfig,
    pub validation: ValidationConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            providers: ProvidersConfig::resolve()?,
            workspace: WorkspaceConfig::resolve()?,
            build: BuildConfig::resolve()?,
            smoke: SmokeConfig::resolve()?,
            evolve: EvolveConfig::resolve()?,
            validation: ValidationConfig::resolve()?,
        })
    }
}

/// Credentials and endpoints for the AI backends.
#[derive(Debug, Clone, Default)]
pub struct ProvidersConfig {
    pub openai: Option<OpenAiConfig>,
    pub anthropic: Option<AnthropicConfig>,
    pub local: Option<LocalConfig>,
}

impl ProvidersConfig {
    fn resolve() -> Result<Self, ConfigError> {
        let openai = optional_env("OPENAI_API_KEY")?.map(|key| OpenAiConfig {
            api_key: SecretString::from(key),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
        });

        let anthropic = optional_env("ANTHROPIC_API_KEY")?.map(|key| AnthropicConfig {
            api_key: SecretString::from(key),
            base_url: std::env::var("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com".to_string()),
            model: std::env::var("ANTHROPIC_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string()),
        });

        let local = optional_env("FORGEHUB_LOCAL_BASE_URL")?.map(|base_url| LocalConfig {
            base_url,
            api_key: optional_env("FORGEHUB_LOCAL_API_KEY")
                .ok()
                .flatten()
                .map(SecretString::from),
            model: std::env::var("FORGEHUB_LOCAL_MODEL").unwrap_or_else(|_| "llama3".to_string()),
        });

        Ok(Self {
            openai,
            anthropic,
            local,
        })
    }

    /// Number of configured backends.
    pub fn configured_count(&self) -> usize {
        [
            self.openai.is_some(),
            self.anthropic.is_some(),
            self.local.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }
}

/// OpenAI backend configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
}

/// Anthropic backend configuration.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
}

/// OpenAI-compatible local endpoint configuration (Ollama, vLLM, etc.).
#[derive(Debug, Clone)]
pub struct LocalConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
}

/// Filesystem layout: one subdirectory per acquired project under the
/// workspace root, one subdirectory per snapshot under the backup root.
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    pub root: PathBuf,
    pub backup_root: PathBuf,
    /// Path to the JSON server registry file.
    pub registry_path: PathBuf,
}

impl WorkspaceConfig {
    fn resolve() -> Result<Self, ConfigError> {
        let home = || {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".forgehub")
        };

        let root = optional_env("FORGEHUB_WORKSPACE")?
            .map(PathBuf::from)
            .unwrap_or_else(|| home().join("workspace"));

        let backup_root = optional_env("FORGEHUB_BACKUPS")?
            .map(PathBuf::from)
            .unwrap_or_else(|| home().join("backups"));

        let registry_path = optional_env("FORGEHUB_REGISTRY")?
            .map(PathBuf::from)
            .unwrap_or_else(|| home().join("servers.json"));

        Ok(Self {
            root,
            backup_root,
            registry_path,
        })
    }
}

/// Build pipeline configuration.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Hard wall-clock timeout per command execution.
    pub command_timeout: Duration,
    /// Maximum build log lines retained (oldest trimmed beyond this).
    pub log_limit: usize,
}

impl BuildConfig {
    fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            command_timeout: duration_secs_env("FORGEHUB_BUILD_TIMEOUT_SECS", 300)?,
            log_limit: usize_env("FORGEHUB_BUILD_LOG_LIMIT", 2000)?,
        })
    }
}

/// Smoke test configuration.
#[derive(Debug, Clone)]
pub struct SmokeConfig {
    /// Per-tool call timeout.
    pub call_timeout: Duration,
    /// Timeout for the initialize handshake when connecting.
    pub connect_timeout: Duration,
}

impl SmokeConfig {
    fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            call_timeout: duration_secs_env("FORGEHUB_SMOKE_CALL_TIMEOUT_SECS", 10)?,
            connect_timeout: duration_secs_env("FORGEHUB_SMOKE_CONNECT_TIMEOUT_SECS", 15)?,
        })
    }
}

/// Self-analysis and self-modification configuration.
#[derive(Debug, Clone)]
pub struct EvolveConfig {
    /// Minimum proposal confidence before a rewrite is applied.
    pub apply_threshold: f64,
    /// Maximum files touched per improvement run.
    pub max_files_per_run: usize,
    /// Maximum files gathered by the recursive source walk.
    pub max_walk_files: usize,
    /// Source roots walked when no explicit targets are given.
    pub source_roots: Vec<PathBuf>,
    /// Subtrees self-modification may write into.
    pub safe_dirs: Vec<PathBuf>,
}

impl EvolveConfig {
    fn resolve() -> Result<Self, ConfigError> {
        let apply_threshold = match optional_env("FORGEHUB_APPLY_THRESHOLD")? {
            Some(raw) => raw.parse::<f64>().map_err(|_| ConfigError::InvalidValue {
                key: "FORGEHUB_APPLY_THRESHOLD".to_string(),
                message: format!("expected a number in [0,1], got '{raw}'"),
            })?,
            None => 0.7,
        };
        if !(0.0..=1.0).contains(&apply_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "FORGEHUB_APPLY_THRESHOLD".to_string(),
                message: format!("must be within [0,1], got {apply_threshold}"),
            });
        }

        Ok(Self {
            apply_threshold,
            max_files_per_run: usize_env("FORGEHUB_MAX_FILES_PER_RUN", 10)?,
            max_walk_files: usize_env("FORGEHUB_MAX_WALK_FILES", 200)?,
            source_roots: vec![PathBuf::from("src")],
            safe_dirs: vec![PathBuf::from("src")],
        })
    }
}

/// Post-modification validation configuration.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Test command executed when `run_tests` is requested.
    pub test_command: String,
    pub test_timeout: Duration,
    /// How far back the recent-mtime heuristic looks for changed files.
    pub recent_window: Duration,
}

impl ValidationConfig {
    fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            test_command: optional_env("FORGEHUB_TEST_COMMAND")?
                .unwrap_or_else(|| "cargo test --quiet".to_string()),
            test_timeout: duration_secs_env("FORGEHUB_TEST_TIMEOUT_SECS", 600)?,
            recent_window: duration_secs_env("FORGEHUB_RECENT_WINDOW_SECS", 1800)?,
        })
    }
}

/// Read an optional env var, treating empty strings as unset.
fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value is not valid unicode".to_string(),
        }),
    }
}

fn usize_env(key: &str, default: usize) -> Result<usize, ConfigError> {
    match optional_env(key)? {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected an integer, got '{raw}'"),
        }),
        None => Ok(default),
    }
}

fn duration_secs_env(key: &str, default_secs: u64) -> Result<Duration, ConfigError> {
    match optional_env(key)? {
        Some(raw) => raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected seconds as an integer, got '{raw}'"),
            }),
        None => Ok(Duration::from_secs(default_secs)),
    }
}
