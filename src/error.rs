//! Error types for forgehub.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for the hub.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Acquisition error: {0}")]
    Acquire(#[from] AcquireError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Smoke test error: {0}")]
    Smoke(#[from] SmokeError),

    #[error("Self-modification error: {0}")]
    Evolve(#[from] EvolveError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// AI provider errors.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider {provider} rate limited, retry in {retry_in:?}")]
    RateLimited {
        provider: String,
        retry_in: Duration,
    },

    #[error("Provider {provider} returned HTTP {status}: {body}")]
    Upstream {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Provider {provider} timed out after {after:?}")]
    Timeout { provider: String, after: Duration },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Context length exceeded: {estimated} tokens estimated, {limit} allowed")]
    ContextLengthExceeded { estimated: usize, limit: usize },

    #[error("No AI providers configured")]
    NoProvidersConfigured,

    #[error("Insufficient providers for ensemble: need {required}, have {configured}")]
    InsufficientProviders { required: usize, configured: usize },

    #[error("Ensemble failed: {succeeded} of {required} required providers succeeded")]
    EnsembleFailed { required: usize, succeeded: usize },

    #[error("All providers exhausted after {attempts} attempts")]
    AllProvidersExhausted { attempts: usize },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Repository acquisition and build errors.
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("Clone failed for {url}: {reason}")]
    CloneFailed { url: String, reason: String },

    #[error("Build failed: `{command}` exited with status {status}")]
    BuildFailed { command: String, status: i32 },

    #[error("Command `{command}` timed out after {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Server registration errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Working directory not found: {}", path.display())]
    DirectoryNotFound { path: PathBuf },

    #[error("Registration of {name} rejected: {reason}")]
    RegistrationFailed { name: String, reason: String },

    #[error("Registry persistence failed: {0}")]
    Persist(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Smoke test errors.
#[derive(Debug, thiserror::Error)]
pub enum SmokeError {
    #[error("Server {name} not found in registry")]
    ServerNotFound { name: String },

    #[error("Server {name} is disabled")]
    ServerDisabled { name: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Tool call timed out after {0:?}")]
    CallTimeout(Duration),
}

/// Self-analysis, modification, and rollback errors.
#[derive(Debug, thiserror::Error)]
pub enum EvolveError {
    #[error("No backups found")]
    NoBackupsFound,

    #[error("Snapshot {id} not found")]
    SnapshotNotFound { id: String },

    #[error("Rollback requires confirm=true")]
    ConfirmationRequired,

    #[error("Snapshot creation failed: {0}")]
    SnapshotFailed(String),

    #[error("No target files resolved")]
    NoTargets,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the hub.
pub type Result<T> = std::result::Result<T, Error>;
