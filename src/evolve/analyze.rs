//! Self-analysis engine.
//!
//! Walks the hub's own source tree and asks the provider manager to
//! critique each file, either through one adapter or in ensemble mode.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{Config, EvolveConfig};
use crate::llm::analysis::{
    AnalysisFinding, AnalysisKind, AnalysisRequest, ConsensusFinding, Impact, Severity,
};
use crate::llm::chunk::clamp_to_context;
use crate::llm::manager::ProviderManager;
use crate::evolve::sources::{detect_language, resolve_targets};

/// Fixed description of the hub, included with every analysis request so
/// critiques are grounded in what the code is for.
pub(crate) const APP_CONTEXT: &str =
    "forgehub: a hub subsystem that provisions MCP tool-servers from source repositories \
     (clone, build, register, smoke test) and supervises LLM-driven maintenance of its own \
     codebase (analysis, guarded modification, validation, rollback).";

/// Token budget for one file's content within an analysis request.
const ANALYSIS_CONTENT_TOKENS: usize = 24_000;

/// Request for one self-analysis run.
#[derive(Debug, Clone)]
pub struct AnalyzeRequest {
    pub kind: AnalysisKind,
    /// Explicit targets; the source roots are walked when absent.
    pub target_files: Option<Vec<PathBuf>>,
    /// Ask several adapters and merge instead of asking one.
    pub ensemble: bool,
    /// Minimum successful adapters for ensemble mode.
    pub min_providers: usize,
}

/// Analysis result for one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub path: PathBuf,
    /// Adapters that contributed.
    pub providers: Vec<String>,
    /// Single-adapter finding (single mode).
    pub finding: Option<AnalysisFinding>,
    /// Merged finding (ensemble mode).
    pub consensus: Option<ConsensusFinding>,
    pub error: Option<String>,
}

/// Structured result of `analyze_self`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub success: bool,
    pub files_analyzed: usize,
    pub total_issues: usize,
    pub total_suggestions: usize,
    pub critical_issues: usize,
    pub high_impact_suggestions: usize,
    pub files: Vec<FileAnalysis>,
    pub error: Option<String>,
}

impl AnalysisReport {
    fn failed(error: String) -> Self {
        Self {
            success: false,
            files_analyzed: 0,
            total_issues: 0,
            total_suggestions: 0,
            critical_issues: 0,
            high_impact_suggestions: 0,
            files: Vec::new(),
            error: Some(error),
        }
    }
}

/// Analyze the hub's own source files.
pub async fn analyze_self(config: &Config, req: &AnalyzeRequest) -> AnalysisReport {
    let manager = ProviderManager::from_config(&config.providers);
    analyze_self_with(&manager, &config.evolve, req).await
}

/// Analysis over an explicit manager, for callers that already own one.
pub async fn analyze_self_with(
    manager: &ProviderManager,
    evolve: &EvolveConfig,
    req: &AnalyzeRequest,
) -> AnalysisReport {
    // Provider check precedes all file access.
    if manager.is_empty() {
        return AnalysisReport::failed(
            crate::error::ProviderError::NoProvidersConfigured.to_string(),
        );
    }

    let targets = resolve_targets(
        req.target_files.as_deref(),
        &evolve.source_roots,
        evolve.max_walk_files,
    );
    if targets.is_empty() {
        return AnalysisReport::failed("no source files resolved".to_string());
    }

    let mut files = Vec::with_capacity(targets.len());
    for path in &targets {
        files.push(analyze_one(manager, req, path).await);
    }

    let mut total_issues = 0;
    let mut total_suggestions = 0;
    let mut critical_issues = 0;
    let mut high_impact_suggestions = 0;
    for file in &files {
        let (issues, suggestions) = match (&file.finding, &file.consensus) {
            (Some(f), _) => (&f.issues, &f.suggestions),
            (None, Some(c)) => (&c.issues, &c.suggestions),
            (None, None) => continue,
        };
        total_issues += issues.len();
        total_suggestions += suggestions.len();
        critical_issues += issues
            .iter()
            .filter(|i| i.severity == Severity::Critical)
            .count();
        high_impact_suggestions += suggestions
            .iter()
            .filter(|s| s.impact == Impact::High)
            .count();
    }

    let report = AnalysisReport {
        success: true,
        files_analyzed: files.iter().filter(|f| f.error.is_none()).count(),
        total_issues,
        total_suggestions,
        critical_issues,
        high_impact_suggestions,
        files,
        error: None,
    };

    tracing::info!(
        files = report.files_analyzed,
        issues = report.total_issues,
        critical = report.critical_issues,
        "self-analysis complete"
    );
    report
}

async fn analyze_one(
    manager: &ProviderManager,
    req: &AnalyzeRequest,
    path: &Path,
) -> FileAnalysis {
    let mut result = FileAnalysis {
        path: path.to_path_buf(),
        providers: Vec::new(),
        finding: None,
        consensus: None,
        error: None,
    };

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            result.error = Some(format!("read failed: {e}"));
            return result;
        }
    };

    let (content, truncated) = clamp_to_context(&content, ANALYSIS_CONTENT_TOKENS);
    if truncated {
        tracing::debug!(file = %path.display(), "content clamped to context budget");
    }

    let analysis_request = AnalysisRequest {
        content,
        relative_path: relative_display(path),
        language: detect_language(path).to_string(),
        app_context: APP_CONTEXT.to_string(),
        kind: req.kind,
    };

    if req.ensemble {
        match manager
            .ensemble_analysis(&analysis_request, req.min_providers)
            .await
        {
            Ok(consensus) => {
                result.providers = consensus.providers.clone();
                result.consensus = Some(consensus);
            }
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "ensemble analysis failed");
                result.error = Some(err.to_string());
            }
        }
    } else {
        match manager.analyze_code(&analysis_request).await {
            Ok((provider, finding)) => {
                result.providers = vec![provider];
                result.finding = Some(finding);
            }
            Err(err) => {
                tracing::warn!(file = %path.display(), error = %err, "analysis failed");
                result.error = Some(err.to_string());
            }
        }
    }

    result
}

/// Path relative to the current directory, for prompts and reports.
pub(crate) fn relative_display(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|cwd| path.strip_prefix(&cwd).ok())
        .unwrap_or(path)
        .display()
        .to_string()
}
