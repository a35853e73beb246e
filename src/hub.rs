//! Hub facade.
//!
//! One object wiring the engines together and exposing the outbound
//! operations. Every operation returns a structured report with a success
//! flag and error field; nothing throws across this boundary.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::ProviderError;
use crate::evolve::analyze::{AnalysisReport, AnalyzeRequest, analyze_self};
use crate::evolve::backup::{RollbackReport, RollbackRequest, SnapshotStore};
use crate::evolve::improve::{ImproveReport, ImproveRequest, improve_codebase};
use crate::evolve::validate::{ValidateRequest, ValidationReport, Validator};
use crate::forge::acquire::{AcquireRequest, CloneBuildReport, clone_and_build};
use crate::forge::register::{RegisterReport, RegisterRequest, register_server};
use crate::llm::analysis::{AnalysisRequest, ConsensusFinding};
use crate::llm::manager::ProviderManager;
use crate::mcp::smoke::{SmokeReport, SmokeRequest, SmokeRunner};
use crate::mcp::stdio::{McpConnector, StdioConnector};
use crate::registry::{JsonRegistry, ServerRegistry};

/// Structured result of a direct ensemble analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleReport {
    pub success: bool,
    pub consensus: Option<ConsensusFinding>,
    pub error: Option<String>,
}

/// The hub: owns configuration, the registry seam, the snapshot store,
/// and the smoke connector.
pub struct Hub {
    config: Config,
    registry: Arc<dyn ServerRegistry>,
    connector: Arc<dyn McpConnector>,
    snapshots: SnapshotStore,
}

impl Hub {
    /// Wire a hub from configuration with the default (file-backed
    /// registry, stdio connector) collaborators.
    pub fn new(config: Config) -> Self {
        let registry: Arc<dyn ServerRegistry> =
            Arc::new(JsonRegistry::new(&config.workspace.registry_path));
        let connector: Arc<dyn McpConnector> =
            Arc::new(StdioConnector::new(config.smoke.connect_timeout));
        let snapshots = SnapshotStore::new(&config.workspace.backup_root);
        Self {
            config,
            registry,
            connector,
            snapshots,
        }
    }

    /// Wire a hub with explicit collaborators (used by tests and by the
    /// real hub process, which brings its own registry).
    pub fn with_collaborators(
        config: Config,
        registry: Arc<dyn ServerRegistry>,
        connector: Arc<dyn McpConnector>,
    ) -> Self {
        let snapshots = SnapshotStore::new(&config.workspace.backup_root);
        Self {
            config,
            registry,
            connector,
            snapshots,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> Arc<dyn ServerRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Acquire a repository and build it in the workspace.
    pub async fn clone_and_build(&self, req: &AcquireRequest) -> CloneBuildReport {
        clone_and_build(&self.config.workspace, &self.config.build, req).await
    }

    /// Persist a built project as a server definition.
    pub async fn register_server(&self, req: &RegisterRequest) -> RegisterReport {
        register_server(self.registry.as_ref(), &self.config.workspace.root, req).await
    }

    /// Exercise every declared tool on a registered server.
    pub async fn smoke_run(&self, req: &SmokeRequest) -> SmokeReport {
        let runner = SmokeRunner::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.connector),
            self.config.smoke.clone(),
        );
        runner.smoke_run(req).await
    }

    /// Critique the hub's own source files.
    pub async fn analyze_self(&self, req: &AnalyzeRequest) -> AnalysisReport {
        analyze_self(&self.config, req).await
    }

    /// Rewrite the hub's own source files under the safety guards.
    pub async fn improve_codebase(&self, req: &ImproveRequest) -> ImproveReport {
        improve_codebase(&self.config, &self.snapshots, req).await
    }

    /// Run static checks and optionally the test suite.
    pub async fn validate_changes(&self, req: &ValidateRequest) -> ValidationReport {
        let validator = Validator {
            validation: &self.config.validation,
            build: &self.config.build,
            source_roots: &self.config.evolve.source_roots,
            max_files: self.config.evolve.max_walk_files,
        };
        validator.validate_changes(req).await
    }

    /// Restore files from a snapshot.
    pub async fn rollback_modifications(&self, req: &RollbackRequest) -> RollbackReport {
        self.snapshots.rollback_modifications(req)
    }

    /// Consensus analysis of caller-supplied content, sharing the
    /// provider manager with the self-analysis flow.
    pub async fn ensemble_analysis(
        &self,
        req: &AnalysisRequest,
        min_providers: usize,
    ) -> EnsembleReport {
        let manager = ProviderManager::from_config(&self.config.providers);
        if manager.is_empty() {
            return EnsembleReport {
                success: false,
                consensus: None,
                error: Some(ProviderError::NoProvidersConfigured.to_string()),
            };
        }

        match manager.ensemble_analysis(req, min_providers).await {
            Ok(consensus) => EnsembleReport {
                success: true,
                consensus: Some(consensus),
                error: None,
            },
            Err(err) => EnsembleReport {
                success: false,
                consensus: None,
                error: Some(err.to_string()),
            },
        }
    }

    /// Diagnostic: configured adapters and whether each answers a probe.
    pub async fn provider_status(&self) -> Vec<(String, bool)> {
        let manager = ProviderManager::from_config(&self.config.providers);
        let mut status = Vec::new();
        for adapter in manager.adapters() {
            status.push((adapter.name().to_string(), adapter.is_available().await));
        }
        status
    }
}
