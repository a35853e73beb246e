//! OpenAI chat-completions adapter.
//!
//! Also home to the OpenAI-compatible wire types and request loop shared
//! with the local-endpoint adapter, since any OpenAI-compatible backend
//! speaks the same shapes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::OpenAiConfig;
use crate::error::ProviderError;
use crate::llm::adapter::{
    ChatAdapter, ChatMessage, Completion, CompletionOptions, FinishReason, ProviderProfile, Role,
    TokenUsage,
};
use crate::llm::chunk::estimate_message_tokens;
use crate::llm::gate::RequestGate;
use crate::llm::retry::{http_backoff_delay, is_retryable_status};

/// Default request deadline when the caller sets none.
pub(crate) const DEFAULT_DEADLINE: Duration = Duration::from_secs(120);
/// Transient-status retries inside one `complete` call.
pub(crate) const MAX_HTTP_RETRIES: u32 = 2;

const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(500);

/// OpenAI chat-completions API adapter.
pub struct OpenAiAdapter {
    client: Client,
    config: OpenAiConfig,
    gate: RequestGate,
}

impl OpenAiAdapter {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            gate: RequestGate::new(MIN_REQUEST_INTERVAL),
        }
    }

    fn api_key(&self) -> String {
        self.config.api_key.expose_secret().to_string()
    }
}

#[async_trait]
impl ChatAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            name: "openai".to_string(),
            supported_models: vec![
                "gpt-4o".to_string(),
                "gpt-4o-mini".to_string(),
                "gpt-4.1".to_string(),
            ],
            default_model: self.config.model.clone(),
            min_request_interval: MIN_REQUEST_INTERVAL,
        }
    }

    fn context_limit(&self, model: &str) -> usize {
        if model.starts_with("gpt-4.1") {
            1_000_000
        } else {
            128_000
        }
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        (dec!(0.0000025), dec!(0.00001))
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
            model: model.clone(),
            messages: messages.iter().map(wire::ChatCompletionMessage::from).collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        let response = send_chat_request(
            &self.client,
            &format!("{}/v1/chat/completions", self.config.base_url),
            Some(&self.api_key()),
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
            Some(&self.api_key()),
        )
        .await
    }
}

/// Reject requests whose estimated size exceeds the model context window.
pub(crate) fn enforce_context(
    provider: &str,
    messages: &[ChatMessage],
    limit: usize,
) -> Result<(), ProviderError> {
    let estimated = estimate_message_tokens(messages.iter().map(|m| m.content.as_str()));
    if estimated > limit {
        tracing::warn!(
            provider,
            estimated,
            limit,
            "request exceeds model context window"
        );
        return Err(ProviderError::ContextLengthExceeded { estimated, limit });
    }
    Ok(())
}

/// POST an OpenAI-shaped chat request with transient-status retries and a
/// hard deadline.
///
/// The deadline aborts the in-flight request and is not retried; connect
/// errors and retryable statuses are retried with jittered backoff.
pub(crate) async fn send_chat_request(
    client: &Client,
    url: &str,
    api_key: Option<&str>,
    provider: &str,
    request: &wire::ChatCompletionRequest,
    deadline: Duration,
) -> Result<wire::ChatCompletionResponse, ProviderError> {
    for attempt in 0..=MAX_HTTP_RETRIES {
        let mut builder = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(request);
        if let Some(key) = api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = match tokio::time::timeout(deadline, builder.send()).await {
            Err(_) => {
                return Err(ProviderError::Timeout {
                    provider: provider.to_string(),
                    after: deadline,
                });
            }
            Ok(Err(e)) => {
                if attempt < MAX_HTTP_RETRIES {
                    let delay = http_backoff_delay(attempt);
                    tracing::warn!(
                        provider,
                        error = %e,
                        attempt,
                        "chat request failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(ProviderError::Http(e));
            }
            Ok(Ok(r)) => r,
        };

        let status = response.status().as_u16();
        let body = match tokio::time::timeout(deadline, response.text()).await {
            Err(_) => {
                return Err(ProviderError::Timeout {
                    provider: provider.to_string(),
                    after: deadline,
                });
            }
            Ok(result) => result.unwrap_or_default(),
        };

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthFailed {
                provider: provider.to_string(),
            });
        }

        if !(200..300).contains(&status) {
            if is_retryable_status(status) && attempt < MAX_HTTP_RETRIES {
                let delay = http_backoff_delay(attempt);
                tracing::warn!(
                    provider,
                    status,
                    attempt,
                    "chat request returned transient status, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
                continue;
            }
            return Err(ProviderError::Upstream {
                provider: provider.to_string(),
                status,
                body,
            });
        }

        return serde_json::from_str(&body).map_err(|e| ProviderError::InvalidResponse {
            provider: provider.to_string(),
            reason: format!("JSON parse error: {e}. Raw: {body}"),
        });
    }

    // Unreachable: the loop always returns on its final attempt.
    Err(ProviderError::InvalidResponse {
        provider: provider.to_string(),
        reason: "retry loop exited unexpectedly".to_string(),
    })
}

/// Map an OpenAI-shaped response to the normalized [`Completion`].
pub(crate) fn completion_from_response(
    provider: &str,
    response: wire::ChatCompletionResponse,
) -> Result<Completion, ProviderError> {
    let model = response.model.clone();
    let usage = response.usage.map(|u| TokenUsage {
        input_tokens: u.prompt_tokens,
        output_tokens: u.completion_tokens,
    });

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidResponse {
            provider: provider.to_string(),
            reason: "no choices in response".to_string(),
        })?;

    let finish_reason = match choice.finish_reason.as_deref() {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Unknown,
    };

    Ok(Completion {
        content: choice.message.content.unwrap_or_default(),
        model,
        usage,
        finish_reason,
    })
}

/// GET a `/v1/models`-style endpoint as a minimal availability probe.
pub(crate) async fn probe_models_endpoint(
    client: &Client,
    url: &str,
    api_key: Option<&str>,
) -> bool {
    let mut builder = client.get(url);
    if let Some(key) = api_key {
        builder = builder.header("Authorization", format!("Bearer {key}"));
    }

    match tokio::time::timeout(Duration::from_secs(5), builder.send()).await {
        Ok(Ok(response)) => response.status().is_success(),
        _ => false,
    }
}

// OpenAI-compatible wire types, shared with the local-endpoint adapter.
pub(crate) mod wire {
    use super::*;

    #[derive(Debug, Serialize)]
    pub(crate) struct ChatCompletionRequest {
        pub model: String,
        pub messages: Vec<ChatCompletionMessage>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub temperature: Option<f32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub max_tokens: Option<u32>,
    }

    #[derive(Debug, Serialize)]
    pub(crate) struct ChatCompletionMessage {
        pub role: &'static str,
        pub content: String,
    }

    impl From<&ChatMessage> for ChatCompletionMessage {
        fn from(msg: &ChatMessage) -> Self {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            Self {
                role,
                content: msg.content.clone(),
            }
        }
    }

    #[derive(Debug, Deserialize)]
    pub(crate) struct ChatCompletionResponse {
        pub model: String,
        pub choices: Vec<ChatCompletionChoice>,
        #[serde(default)]
        pub usage: Option<ChatCompletionUsage>,
    }

    #[derive(Debug, Deserialize)]
    pub(crate) struct ChatCompletionChoice {
        pub message: ChatCompletionResponseMessage,
        pub finish_reason: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub(crate) struct ChatCompletionResponseMessage {
        pub content: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub(crate) struct ChatCompletionUsage {
        pub prompt_tokens: u32,
        pub completion_tokens: u32,
    }
}
