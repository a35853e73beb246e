//! Server registration.
//!
//! Persists a built project as a server definition through the registry
//! seam and triggers the hub's hot reload on success.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::forge::process::dir_exists;
use crate::registry::{ServerDefinition, ServerRegistry};

/// Request to register one server.
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    /// Resolved against the workspace root when relative.
    pub working_dir: PathBuf,
    pub env: HashMap<String, String>,
    pub enabled: bool,
}

/// Structured result of `register_server`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterReport {
    pub success: bool,
    pub definition: Option<ServerDefinition>,
    pub error: Option<String>,
}

/// Register (or update) a server definition.
pub async fn register_server(
    registry: &dyn ServerRegistry,
    workspace_root: &Path,
    req: &RegisterRequest,
) -> RegisterReport {
    match run(registry, workspace_root, req).await {
        Ok(definition) => RegisterReport {
            success: true,
            definition: Some(definition),
            error: None,
        },
        Err(err) => {
            tracing::warn!(server = %req.name, error = %err, "registration failed");
            RegisterReport {
                success: false,
                definition: None,
                error: Some(err.to_string()),
            }
        }
    }
}

async fn run(
    registry: &dyn ServerRegistry,
    workspace_root: &Path,
    req: &RegisterRequest,
) -> Result<ServerDefinition, RegistryError> {
    let working_dir = if req.working_dir.is_absolute() {
        req.working_dir.clone()
    } else {
        workspace_root.join(&req.working_dir)
    };

    if !dir_exists(&working_dir) {
        return Err(RegistryError::DirectoryNotFound { path: working_dir });
    }

    let definition = ServerDefinition {
        name: req.name.clone(),
        command: req.command.clone(),
        args: req.args.clone(),
        working_dir,
        env: req.env.clone(),
        enabled: req.enabled,
        owner: "forgehub".to_string(),
    };

    let ack = registry.upsert(&req.name, definition.clone()).await?;
    if !ack.success {
        return Err(RegistryError::RegistrationFailed {
            name: req.name.clone(),
            reason: ack.message.unwrap_or_else(|| "registry rejected the definition".to_string()),
        });
    }

    registry.notify_changed().await;
    tracing::info!(server = %req.name, "server registered");
    Ok(definition)
}
