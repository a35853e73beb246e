//! Self-modification engine.
//!
//! Asks the provider manager to rewrite files and applies the result only
//! when all guards pass: not a dry run, confidence above the configured
//! threshold, and a covering snapshot taken before the first write.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{Config, EvolveConfig};
use crate::evolve::analyze::relative_display;
use crate::evolve::backup::SnapshotStore;
use crate::evolve::sources::{detect_language, resolve_targets, restrict_to_safe_dirs};
use crate::llm::analysis::{ImprovementKind, ModificationProposal, ModificationRequest, SafetyLevel};
use crate::llm::chunk::estimate_tokens;
use crate::llm::manager::ProviderManager;

/// Files larger than this are skipped rather than truncated: a rewrite of
/// half a file is worse than no rewrite.
const MAX_REWRITE_TOKENS: usize = 24_000;

/// Request for one improvement run.
#[derive(Debug, Clone)]
pub struct ImproveRequest {
    pub kind: ImprovementKind,
    /// Explicit targets; safe subtrees are walked when absent.
    pub target_files: Option<Vec<PathBuf>>,
    pub safety: SafetyLevel,
    /// Propose without writing anything.
    pub dry_run: bool,
}

/// Modification result for one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileImprovement {
    pub path: PathBuf,
    pub applied: bool,
    pub provider: Option<String>,
    pub proposal: Option<ModificationProposal>,
    pub error: Option<String>,
}

/// Structured result of `improve_codebase`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImproveReport {
    pub success: bool,
    pub dry_run: bool,
    /// Snapshot covering every candidate file (absent in dry runs).
    pub snapshot_id: Option<String>,
    pub applied_count: usize,
    pub files: Vec<FileImprovement>,
    pub error: Option<String>,
}

impl ImproveReport {
    fn failed(dry_run: bool, error: String) -> Self {
        Self {
            success: false,
            dry_run,
            snapshot_id: None,
            applied_count: 0,
            files: Vec::new(),
            error: Some(error),
        }
    }
}

/// Improve the hub's own source files.
pub async fn improve_codebase(
    config: &Config,
    store: &SnapshotStore,
    req: &ImproveRequest,
) -> ImproveReport {
    let manager = ProviderManager::from_config(&config.providers);
    improve_codebase_with(&manager, &config.evolve, store, req).await
}

/// Improvement over an explicit manager, for callers that already own one.
pub async fn improve_codebase_with(
    manager: &ProviderManager,
    evolve: &EvolveConfig,
    store: &SnapshotStore,
    req: &ImproveRequest,
) -> ImproveReport {
    if manager.is_empty() {
        return ImproveReport::failed(
            req.dry_run,
            crate::error::ProviderError::NoProvidersConfigured.to_string(),
        );
    }

    let targets = resolve_targets(
        req.target_files.as_deref(),
        &evolve.safe_dirs,
        evolve.max_walk_files,
    );
    let targets = restrict_to_safe_dirs(targets, &evolve.safe_dirs);
    if targets.is_empty() {
        return ImproveReport::failed(req.dry_run, "no target files inside safe subtrees".to_string());
    }

    // Per-run cap bounds both cost and blast radius.
    let targets: Vec<_> = targets.into_iter().take(evolve.max_files_per_run).collect();

    // Every candidate is snapshotted before the first write.
    let snapshot_id = if req.dry_run {
        None
    } else {
        match store.create_snapshot(&targets) {
            Ok(snapshot) => Some(snapshot.id),
            Err(err) => {
                return ImproveReport::failed(
                    req.dry_run,
                    format!("refusing to modify without a snapshot: {err}"),
                );
            }
        }
    };

    let mut files = Vec::with_capacity(targets.len());
    for path in &targets {
        files.push(improve_one(manager, evolve, req, path).await);
    }

    let applied_count = files.iter().filter(|f| f.applied).count();
    tracing::info!(
        candidates = files.len(),
        applied = applied_count,
        dry_run = req.dry_run,
        "improvement run complete"
    );

    ImproveReport {
        success: true,
        dry_run: req.dry_run,
        snapshot_id,
        applied_count,
        files,
        error: None,
    }
}

async fn improve_one(
    manager: &ProviderManager,
    evolve: &EvolveConfig,
    req: &ImproveRequest,
    path: &Path,
) -> FileImprovement {
    let mut result = FileImprovement {
        path: path.to_path_buf(),
        applied: false,
        provider: None,
        proposal: None,
        error: None,
    };

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            result.error = Some(format!("read failed: {e}"));
            return result;
        }
    };

    if estimate_tokens(&content) > MAX_REWRITE_TOKENS {
        result.error = Some("file too large for a whole-file rewrite".to_string());
        return result;
    }

    let modification = ModificationRequest {
        content,
        relative_path: relative_display(path),
        language: detect_language(path).to_string(),
        kind: req.kind,
        safety: req.safety,
    };

    let (provider, proposal) = match manager.propose_modification(&modification).await {
        Ok(pair) => pair,
        Err(err) => {
            tracing::warn!(file = %path.display(), error = %err, "proposal failed");
            result.error = Some(err.to_string());
            return result;
        }
    };

    let confident = proposal.confidence > evolve.apply_threshold;
    if !req.dry_run && confident {
        match std::fs::write(path, &proposal.rewritten_content) {
            Ok(()) => {
                tracing::info!(
                    file = %path.display(),
                    provider = %provider,
                    confidence = proposal.confidence,
                    "rewrite applied"
                );
                result.applied = true;
            }
            Err(e) => {
                result.error = Some(format!("write failed: {e}"));
            }
        }
    } else if !confident {
        tracing::debug!(
            file = %path.display(),
            confidence = proposal.confidence,
            threshold = evolve.apply_threshold,
            "proposal below apply threshold"
        );
    }

    result.provider = Some(provider);
    result.proposal = Some(proposal);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use crate::error::ProviderError;
    use crate::llm::adapter::{
        ChatAdapter, ChatMessage, Completion, CompletionOptions, FinishReason, ProviderProfile,
    };

    /// Adapter answering every request with a fixed proposal JSON.
    struct RewriterAdapter {
        confidence: f64,
    }

    #[async_trait]
    impl ChatAdapter for RewriterAdapter {
        fn name(&self) -> &str {
            "rewriter"
        }
        fn profile(&self) -> ProviderProfile {
            ProviderProfile {
                name: "rewriter".to_string(),
                supported_models: vec![],
                default_model: "mock".to_string(),
                min_request_interval: Duration::ZERO,
            }
        }
        fn context_limit(&self, _model: &str) -> usize {
            1_000_000
        }
        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (Decimal::ZERO, Decimal::ZERO)
        }
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _options: &CompletionOptions,
        ) -> Result<Completion, ProviderError> {
            let body = serde_json::json!({
                "rewritten_content": "// improved\nfn improved() {}\n",
                "rationale": "tidied",
                "change_spans": [],
                "confidence": self.confidence,
                "risks": [],
            });
            Ok(Completion {
                content: body.to_string(),
                model: "mock".to_string(),
                usage: None,
                finish_reason: FinishReason::Stop,
            })
        }
        async fn is_available(&self) -> bool {
            true
        }
    }

    fn evolve_config(root: &Path) -> EvolveConfig {
        EvolveConfig {
            apply_threshold: 0.7,
            max_files_per_run: 2,
            max_walk_files: 50,
            source_roots: vec![root.to_path_buf()],
            safe_dirs: vec![root.to_path_buf()],
        }
    }

    fn manager(confidence: f64) -> ProviderManager {
        ProviderManager::new(vec![Arc::new(RewriterAdapter { confidence })])
    }

    fn request(paths: Vec<PathBuf>, dry_run: bool) -> ImproveRequest {
        ImproveRequest {
            kind: ImprovementKind::RemoveRedundancy,
            target_files: Some(paths),
            safety: SafetyLevel::Conservative,
            dry_run,
        }
    }

    #[tokio::test]
    async fn dry_run_never_writes_regardless_of_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.rs");
        std::fs::write(&file, "original").unwrap();
        let store = SnapshotStore::new(dir.path().join("backups"));

        let report = improve_codebase_with(
            &manager(0.99),
            &evolve_config(dir.path()),
            &store,
            &request(vec![file.clone()], true),
        )
        .await;

        assert!(report.success);
        assert_eq!(report.applied_count, 0);
        assert!(report.snapshot_id.is_none());
        assert!(!report.files[0].applied);
        // Proposal is still reported for the operator to inspect.
        assert!(report.files[0].proposal.is_some());
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "original");
    }

    #[tokio::test]
    async fn confident_proposal_is_applied_after_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.rs");
        std::fs::write(&file, "original").unwrap();
        let store = SnapshotStore::new(dir.path().join("backups"));

        let report = improve_codebase_with(
            &manager(0.9),
            &evolve_config(dir.path()),
            &store,
            &request(vec![file.clone()], false),
        )
        .await;

        assert!(report.success);
        assert_eq!(report.applied_count, 1);
        let snapshot_id = report.snapshot_id.unwrap();
        assert!(std::fs::read_to_string(&file).unwrap().contains("improved"));

        // The snapshot holds the pre-rewrite content.
        let snapshot = store.load(&snapshot_id).unwrap();
        let backup = &snapshot.files[&file];
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "original");
    }

    #[tokio::test]
    async fn low_confidence_proposal_is_not_applied() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.rs");
        std::fs::write(&file, "original").unwrap();
        let store = SnapshotStore::new(dir.path().join("backups"));

        let report = improve_codebase_with(
            &manager(0.5),
            &evolve_config(dir.path()),
            &store,
            &request(vec![file.clone()], false),
        )
        .await;

        assert_eq!(report.applied_count, 0);
        assert!(!report.files[0].applied);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "original");
        // Snapshot was still taken before any decision.
        assert!(report.snapshot_id.is_some());
    }

    #[tokio::test]
    async fn per_run_cap_bounds_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for i in 0..5 {
            let path = dir.path().join(format!("f{i}.rs"));
            std::fs::write(&path, "x").unwrap();
            paths.push(path);
        }
        let store = SnapshotStore::new(dir.path().join("backups"));

        let report = improve_codebase_with(
            &manager(0.9),
            &evolve_config(dir.path()), // max_files_per_run = 2
            &store,
            &request(paths, false),
        )
        .await;

        assert_eq!(report.files.len(), 2);
    }

    #[tokio::test]
    async fn targets_outside_safe_dirs_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let file = outside.path().join("a.rs");
        std::fs::write(&file, "x").unwrap();
        let store = SnapshotStore::new(dir.path().join("backups"));

        let report = improve_codebase_with(
            &manager(0.9),
            &evolve_config(dir.path()),
            &store,
            &request(vec![file.clone()], false),
        )
        .await;

        assert!(!report.success);
        assert!(report.error.unwrap().contains("safe subtrees"));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "x");
    }

    #[tokio::test]
    async fn no_providers_fails_without_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.rs");
        std::fs::write(&file, "x").unwrap();
        let store = SnapshotStore::new(dir.path().join("backups"));

        let report = improve_codebase_with(
            &ProviderManager::new(vec![]),
            &evolve_config(dir.path()),
            &store,
            &request(vec![file], false),
        )
        .await;

        assert!(!report.success);
        assert!(store.list_ids().unwrap().is_empty());
    }
}
