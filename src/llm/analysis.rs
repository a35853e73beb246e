//! Analysis and modification request/result types.
//!
//! Models are prompted to answer with a single JSON object; extraction is
//! tolerant of markdown fences and surrounding prose because backends
//! differ in how strictly they honor format instructions.

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::llm::adapter::ChatMessage;

/// What kind of critique is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    CodeQuality,
    Security,
    Performance,
    Architecture,
}

impl AnalysisKind {
    fn focus(&self) -> &'static str {
        match self {
            Self::CodeQuality => {
                "readability, duplication, dead code, error handling gaps, and naming"
            }
            Self::Security => {
                "injection risks, unsafe input handling, secret exposure, and unvalidated paths"
            }
            Self::Performance => {
                "unnecessary allocation, repeated work, blocking calls, and algorithmic cost"
            }
            Self::Architecture => {
                "module boundaries, coupling, interface design, and responsibility placement"
            }
        }
    }
}

/// One file analysis request sent to a backend.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub content: String,
    pub relative_path: String,
    pub language: String,
    pub app_context: String,
    pub kind: AnalysisKind,
}

/// Severity of a reported issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

/// Expected impact of a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    #[default]
    Low,
    Medium,
    High,
}

/// A concrete improvement suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub impact: Impact,
}

/// A reported problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// One backend's critique of one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisFinding {
    #[serde(default)]
    pub analysis_kind: Option<AnalysisKind>,
    #[serde(default)]
    pub narrative: String,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

/// Several adapters' findings merged into one consensus view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusFinding {
    pub narrative: String,
    pub suggestions: Vec<Suggestion>,
    pub issues: Vec<Issue>,
    /// Derived confidence in (0,1), rewarding cross-adapter overlap.
    pub confidence: f64,
    /// Adapters that contributed.
    pub providers: Vec<String>,
}

/// What kind of rewrite is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementKind {
    RemoveRedundancy,
    HardenFunctions,
    Performance,
    Security,
    Comprehensive,
}

impl ImprovementKind {
    fn instruction(&self) -> &'static str {
        match self {
            Self::RemoveRedundancy => {
                "Remove duplicated and dead code. Collapse copy-pasted logic into shared \
                 helpers. Do not change observable behavior."
            }
            Self::HardenFunctions => {
                "Harden functions against bad input: validate arguments, handle error paths \
                 explicitly, and avoid panics on malformed data."
            }
            Self::Performance => {
                "Improve performance: eliminate repeated work, avoid needless allocation and \
                 copying, and prefer cheaper algorithms where behavior is preserved."
            }
            Self::Security => {
                "Fix security weaknesses: sanitize external input, avoid shell/path/format \
                 injection, and never log or embed secrets."
            }
            Self::Comprehensive => {
                "Improve the file comprehensively: correctness first, then clarity, \
                 robustness, and performance."
            }
        }
    }
}

/// How conservative an applied rewrite must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum, Default)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    #[default]
    Conservative,
    Moderate,
    Aggressive,
}

impl SafetyLevel {
    fn modulation(&self) -> &'static str {
        match self {
            Self::Conservative => {
                "Only make changes you are certain preserve behavior; when in doubt, leave \
                 the code untouched and lower your confidence."
            }
            Self::Moderate => {
                "Prefer safe changes, but restructure code where the improvement is clear."
            }
            Self::Aggressive => {
                "Restructure freely where it meaningfully improves the file, including \
                 public signatures within the file."
            }
        }
    }
}

/// One file rewrite request sent to a backend.
#[derive(Debug, Clone)]
pub struct ModificationRequest {
    pub content: String,
    pub relative_path: String,
    pub language: String,
    pub kind: ImprovementKind,
    pub safety: SafetyLevel,
}

/// A span the model claims to have changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSpan {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub line_range: Option<[u32; 2]>,
}

/// A risk the model flags about its own rewrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Risk {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
}

/// A proposed whole-file rewrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModificationProposal {
    #[serde(default)]
    pub rewritten_content: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub change_spans: Vec<ChangeSpan>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub risks: Vec<Risk>,
}

/// Build the chat messages for an analysis request.
pub fn analysis_messages(req: &AnalysisRequest) -> Vec<ChatMessage> {
    let system = format!(
        "You are a senior {lang} reviewer for the following system:\n{context}\n\
         Critique the file below, focusing on {focus}.\n\
         Answer with a single JSON object and nothing else, shaped as:\n\
         {{\"narrative\": string,\n  \"suggestions\": [{{\"kind\": string, \"description\": string, \
         \"confidence\": number, \"impact\": \"low\"|\"medium\"|\"high\"}}],\n  \
         \"issues\": [{{\"severity\": \"low\"|\"medium\"|\"high\"|\"critical\", \
         \"message\": string, \"location\": string|null}}]}}",
        lang = req.language,
        context = req.app_context,
        focus = req.kind.focus(),
    );

    let user = format!(
        "File: {path}\n```{lang}\n{content}\n```",
        path = req.relative_path,
        lang = req.language,
        content = req.content,
    );

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

/// Build the chat messages for a modification request.
pub fn modification_messages(req: &ModificationRequest) -> Vec<ChatMessage> {
    let system = format!(
        "You are a senior {lang} engineer maintaining this codebase.\n\
         {instruction}\n{modulation}\n\
         Answer with a single JSON object and nothing else, shaped as:\n\
         {{\"rewritten_content\": string (the complete new file),\n  \
         \"rationale\": string,\n  \
         \"change_spans\": [{{\"kind\": string, \"description\": string, \
         \"line_range\": [start, end]|null}}],\n  \
         \"confidence\": number between 0 and 1,\n  \
         \"risks\": [{{\"kind\": string, \"description\": string, \
         \"severity\": \"low\"|\"medium\"|\"high\"|\"critical\"}}]}}",
        lang = req.language,
        instruction = req.kind.instruction(),
        modulation = req.safety.modulation(),
    );

    let user = format!(
        "File: {path}\n```{lang}\n{content}\n```",
        path = req.relative_path,
        lang = req.language,
        content = req.content,
    );

    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

/// Parse an [`AnalysisFinding`] out of raw model output.
pub fn parse_finding(provider: &str, content: &str) -> Result<AnalysisFinding, ProviderError> {
    let json = extract_json_object(content).ok_or_else(|| ProviderError::InvalidResponse {
        provider: provider.to_string(),
        reason: "no JSON object in analysis response".to_string(),
    })?;

    serde_json::from_str(json).map_err(|e| ProviderError::InvalidResponse {
        provider: provider.to_string(),
        reason: format!("analysis JSON did not parse: {e}"),
    })
}

/// Parse a [`ModificationProposal`] out of raw model output.
pub fn parse_proposal(
    provider: &str,
    content: &str,
) -> Result<ModificationProposal, ProviderError> {
    let json = extract_json_object(content).ok_or_else(|| ProviderError::InvalidResponse {
        provider: provider.to_string(),
        reason: "no JSON object in modification response".to_string(),
    })?;

    let proposal: ModificationProposal =
        serde_json::from_str(json).map_err(|e| ProviderError::InvalidResponse {
            provider: provider.to_string(),
            reason: format!("modification JSON did not parse: {e}"),
        })?;

    if proposal.rewritten_content.trim().is_empty() {
        return Err(ProviderError::InvalidResponse {
            provider: provider.to_string(),
            reason: "proposal contained no rewritten content".to_string(),
        });
    }

    Ok(proposal)
}

/// Locate the outermost JSON object in model output, tolerating markdown
/// fences and prose before/after it.
fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&content[start..=end])
}
