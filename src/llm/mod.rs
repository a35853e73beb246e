//! AI backend integration.
//!
//! Each third-party backend gets one adapter normalizing its chat API:
//! - **OpenAI**: chat-completions with bearer auth
//! - **Anthropic**: messages API with x-api-key auth
//! - **Local**: any OpenAI-compatible endpoint (Ollama, vLLM, ...)
//!
//! The [`ProviderManager`] owns the adapters and handles failover, task
//! routing, and multi-adapter consensus.

pub mod adapter;
pub mod analysis;
mod anthropic;
pub mod chunk;
mod compat;
pub mod ensemble;
mod gate;
pub mod manager;
mod openai;
mod retry;

pub use adapter::{
    ChatAdapter, ChatMessage, Completion, CompletionOptions, FinishReason, ProviderProfile, Role,
    TokenUsage, estimated_cost,
};
pub use analysis::{
    AnalysisFinding, AnalysisKind, AnalysisRequest, ChangeSpan, ConsensusFinding, Impact,
    ImprovementKind, Issue, ModificationProposal, ModificationRequest, Risk, SafetyLevel,
    Severity, Suggestion,
};
pub use anthropic::AnthropicAdapter;
pub use compat::CompatAdapter;
pub use gate::RequestGate;
pub use manager::{CompletionPolicy, ProviderManager, TaggedCompletion, TaskKind};
pub use openai::OpenAiAdapter;
