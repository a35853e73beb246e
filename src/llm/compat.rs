//! OpenAI-compatible local endpoint adapter (Ollama, vLLM, LM Studio).
//!
//! Reuses the OpenAI wire types; differs in auth (optional), pricing
//! (free), and a much smaller assumed context window.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;

use crate::config::LocalConfig;
use crate::error::ProviderError;
use crate::llm::adapter::{
    ChatAdapter, ChatMessage, Completion, CompletionOptions, ProviderProfile,
};
use crate::llm::gate::RequestGate;
use crate::llm::openai::{
    DEFAULT_DEADLINE, completion_from_response, enforce_context, probe_models_endpoint,
    send_chat_request, wire,
};

const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);

/// Adapter for any endpoint speaking the OpenAI chat-completions API.
pub struct CompatAdapter {
    client: Client,
    config: LocalConfig,
    gate: RequestGate,
}

impl CompatAdapter {
    pub fn new(config: LocalConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            gate: RequestGate::new(MIN_REQUEST_INTERVAL),
        }
    }

    fn api_key(&self) -> Option<String> {
        self.config
            .api_key
            .as_ref()
            .map(|k| k.expose_secret().to_string())
    }
}

#[async_trait]
impl ChatAdapter for CompatAdapter {
    fn name(&self) -> &str {
        "local"
    }

    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            name: "local".to_string(),
            supported_models: vec![self.config.model.clone()],
            default_model: self.config.model.clone(),
            min_request_interval: MIN_REQUEST_INTERVAL,
        }
    }

    fn context_limit(&self, _model: &str) -> usize {
        32_768
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        (Decimal::ZERO, Decimal::ZERO)
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        self.gate.try_acquire(self.name())?;

        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.config.model.clone());
        enforce_context(self.name(), messages, self.context_limit(&model))?;

        let request = wire::ChatCompletionRequest {
            model,
            messages: messages.iter().map(wire::ChatCompletionMessage::from).collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let response = send_chat_request(
            &self.client,
            &format!("{}/v1/chat/completions", self.config.base_url),
            self.api_key().as_deref(),
            self.name(),
            &request,
            options.timeout.unwrap_or(DEFAULT_DEADLINE),
        )
        .await?;

        completion_from_response(self.name(), response)
    }

    async fn is_available(&self) -> bool {
        probe_models_endpoint(
            &self.client,
            &format!("{}/v1/models", self.config.base_url),
            self.api_key().as_deref(),
        )
        .await
    }
}
