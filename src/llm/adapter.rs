//! Chat adapter trait and value types.
//!
//! Every third-party AI backend is normalized behind [`ChatAdapter`]; the
//! provider manager depends only on this interface.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    /// Model override; the adapter's default model when `None`.
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Hard deadline for the request. The adapter's default when `None`.
    pub timeout: Option<Duration>,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Unknown,
}

/// Token usage reported by the backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// A normalized completion result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    /// Model that actually served the request.
    pub model: String,
    pub usage: Option<TokenUsage>,
    pub finish_reason: FinishReason,
}

/// Static description of one backend adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub name: String,
    pub supported_models: Vec<String>,
    pub default_model: String,
    /// Minimum gap between two requests to this backend.
    pub min_request_interval: Duration,
}

/// Uniform interface over one third-party chat-completion API.
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    /// Stable adapter name used for preference ordering and result tagging.
    fn name(&self) -> &str;

    /// Static profile: models, default model, minimum request interval.
    fn profile(&self) -> ProviderProfile;

    /// Default model for this backend.
    fn default_model(&self) -> String {
        self.profile().default_model
    }

    /// Context window (in estimated tokens) for the given model.
    fn context_limit(&self, model: &str) -> usize;

    /// (input, output) cost per token in USD.
    fn cost_per_token(&self) -> (Decimal, Decimal);

    /// Run one chat completion.
    ///
    /// Fails with `RateLimited` when called before the adapter's minimum
    /// request interval has elapsed, `Upstream` for non-2xx responses,
    /// and `Timeout` when the deadline expires (the request is aborted).
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError>;

    /// Issue a minimal probe against the backend.
    ///
    /// Returns `false` on any failure; never returns an error.
    async fn is_available(&self) -> bool;
}

/// Estimated request cost in USD from usage and per-token pricing.
pub fn estimated_cost(usage: &TokenUsage, cost_per_token: (Decimal, Decimal)) -> Decimal {
    let (input, output) = cost_per_token;
    input * Decimal::from(usage.input_tokens) + output * Decimal::from(usage.output_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn message_constructors_set_roles() {
        assert_eq!(ChatMessage::system("s").role, Role::System);
        assert_eq!(ChatMessage::user("u").role, Role::User);
        assert_eq!(ChatMessage::assistant("a").role, Role::Assistant);
    }

    #[test]
    fn estimated_cost_sums_both_directions() {
        let usage = TokenUsage {
            input_tokens: 1000,
            output_tokens: 100,
        };
        let cost = estimated_cost(&usage, (dec!(0.000003), dec!(0.000015)));
        assert_eq!(cost, dec!(0.0045));
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&ChatMessage::user("hi")).unwrap();
        assert!(json.contains(r#""role":"user""#));
    }
}
