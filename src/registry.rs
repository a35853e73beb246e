//! Server registry seam.
//!
//! The hub's registry and hot-reload machinery are external collaborators;
//! this module defines the trait the pipeline talks to and a file-backed
//! implementation so the crate runs stand-alone.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Persisted description used to launch and dispatch a tool-server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerDefinition {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub enabled: bool,
    #[serde(default)]
    pub owner: String,
}

/// Acknowledgement from a registry upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertAck {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The hub settings view the registry exposes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubSettings {
    #[serde(default)]
    pub servers: HashMap<String, ServerDefinition>,
}

/// Registry of server definitions.
#[async_trait]
pub trait ServerRegistry: Send + Sync {
    /// Insert or replace a definition under `name`.
    async fn upsert(&self, name: &str, def: ServerDefinition) -> Result<UpsertAck, RegistryError>;

    /// Load the current settings.
    async fn load(&self) -> Result<HubSettings, RegistryError>;

    /// Fire-and-forget hot-reload notification.
    async fn notify_changed(&self);
}

/// File-backed registry persisting to a single JSON document.
pub struct JsonRegistry {
    path: PathBuf,
    // Serializes read-modify-write cycles; the file itself is the state.
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn read_settings(&self) -> Result<HubSettings, RegistryError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| RegistryError::Persist(format!("registry file corrupt: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HubSettings::default()),
            Err(e) => Err(RegistryError::Io(e)),
        }
    }

    fn write_settings(&self, settings: &HubSettings) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(settings)
            .map_err(|e| RegistryError::Persist(e.to_string()))?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

#[async_trait]
impl ServerRegistry for JsonRegistry {
    async fn upsert(&self, name: &str, def: ServerDefinition) -> Result<UpsertAck, RegistryError> {
        if name.trim().is_empty() {
            return Ok(UpsertAck {
                success: false,
                message: Some("server name must not be empty".to_string()),
            });
        }

        let _guard = self.write_lock.lock().await;
        let mut settings = self.read_settings()?;
        let replaced = settings.servers.insert(name.to_string(), def).is_some();
        self.write_settings(&settings)?;

        Ok(UpsertAck {
            success: true,
            message: Some(if replaced {
                format!("server {name} updated")
            } else {
                format!("server {name} registered")
            }),
        })
    }

    async fn load(&self) -> Result<HubSettings, RegistryError> {
        self.read_settings()
    }

    async fn notify_changed(&self) {
        // Stand-alone builds have no hub process to poke; the definition
        // file on disk is already the source of truth.
        tracing::info!(registry = %self.path.display(), "server registry changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(name: &str) -> ServerDefinition {
        ServerDefinition {
            name: name.to_string(),
            command: "node".to_string(),
            args: vec!["server.js".to_string()],
            working_dir: PathBuf::from("/tmp/widget"),
            env: HashMap::new(),
            enabled: true,
            owner: "forgehub".to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JsonRegistry::new(dir.path().join("servers.json"));

        let ack = registry.upsert("widget", definition("widget")).await.unwrap();
        assert!(ack.success);

        let settings = registry.load().await.unwrap();
        assert_eq!(settings.servers.len(), 1);
        assert_eq!(settings.servers["widget"], definition("widget"));
    }

    #[tokio::test]
    async fn upsert_replaces_existing_definition() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JsonRegistry::new(dir.path().join("servers.json"));

        registry.upsert("widget", definition("widget")).await.unwrap();

        let mut updated = definition("widget");
        updated.enabled = false;
        let ack = registry.upsert("widget", updated).await.unwrap();
        assert!(ack.success);
        assert!(ack.message.unwrap().contains("updated"));

        let settings = registry.load().await.unwrap();
        assert_eq!(settings.servers.len(), 1);
        assert!(!settings.servers["widget"].enabled);
    }

    #[tokio::test]
    async fn empty_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JsonRegistry::new(dir.path().join("servers.json"));

        let ack = registry.upsert("  ", definition("x")).await.unwrap();
        assert!(!ack.success);
    }

    #[tokio::test]
    async fn missing_file_loads_empty_settings() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JsonRegistry::new(dir.path().join("absent.json"));
        let settings = registry.load().await.unwrap();
        assert!(settings.servers.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_persist_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("servers.json");
        std::fs::write(&path, "{broken").unwrap();

        let registry = JsonRegistry::new(path);
        let err = registry.load().await.unwrap_err();
        assert!(matches!(err, RegistryError::Persist(_)));
    }
}
