//! Anthropic messages API adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::AnthropicConfig;
use crate::error::ProviderError;
use crate::llm::adapter::{
    ChatAdapter, ChatMessage, Completion, CompletionOptions, FinishReason, ProviderProfile, Role,
    TokenUsage,
};
use crate::llm::gate::RequestGate;
use crate::llm::openai::{DEFAULT_DEADLINE, MAX_HTTP_RETRIES, enforce_context};
use crate::llm::retry::{http_backoff_delay, is_retryable_status};

const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(1000);
const API_VERSION: &str = "2023-06-01";
/// The messages API requires max_tokens; used when the caller sets none.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic messages API adapter.
pub struct AnthropicAdapter {
    client: Client,
    config: AnthropicConfig,
    gate: RequestGate,
}

impl AnthropicAdapter {
    pub fn new(config: AnthropicConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            gate: RequestGate::new(MIN_REQUEST_INTERVAL),
        }
    }

    fn api_key(&self) -> String {
        self.config.api_key.expose_secret().to_string()
    }

    async fn send_request(
        &self,
        request: &MessagesRequest,
        deadline: Duration,
    ) -> Result<MessagesResponse, ProviderError> {
        let url = format!("{}/v1/messages", self.config.base_url);

        for attempt in 0..=MAX_HTTP_RETRIES {
            let send = self
                .client
                .post(&url)
                .header("x-api-key", self.api_key())
                .header("anthropic-version", API_VERSION)
                .header("Content-Type", "application/json")
                .json(request)
                .send();

            let response = match tokio::time::timeout(deadline, send).await {
                Err(_) => {
                    return Err(ProviderError::Timeout {
                        provider: "anthropic".to_string(),
                        after: deadline,
                    });
                }
                Ok(Err(e)) => {
                    if attempt < MAX_HTTP_RETRIES {
                        let delay = http_backoff_delay(attempt);
                        tracing::warn!(
                            error = %e,
                            attempt,
                            "anthropic request failed, retrying in {:?}",
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
                        provider: "anthropic".to_string(),
                        after: deadline,
                    });
                }
                Ok(result) => result.unwrap_or_default(),
            };

            if status == 401 || status == 403 {
                return Err(ProviderError::AuthFailed {
                    provider: "anthropic".to_string(),
                });
            }

            if !(200..300).contains(&status) {
                if is_retryable_status(status) && attempt < MAX_HTTP_RETRIES {
                    let delay = http_backoff_delay(attempt);
                    tracing::warn!(
                        status,
                        attempt,
                        "anthropic returned transient status, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(ProviderError::Upstream {
                    provider: "anthropic".to_string(),
                    status,
                    body,
                });
            }

            return serde_json::from_str(&body).map_err(|e| ProviderError::InvalidResponse {
                provider: "anthropic".to_string(),
                reason: format!("JSON parse error: {e}. Raw: {body}"),
            });
        }

        // Unreachable: the loop always returns on its final attempt.
        Err(ProviderError::InvalidResponse {
            provider: "anthropic".to_string(),
            reason: "retry loop exited unexpectedly".to_string(),
        })
    }
}

#[async_trait]
impl ChatAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            name: "anthropic".to_string(),
            supported_models: vec![
                "claude-sonnet-4-20250514".to_string(),
                "claude-opus-4-20250514".to_string(),
                "claude-3-5-haiku-20241022".to_string(),
            ],
            default_model: self.config.model.clone(),
            min_request_interval: MIN_REQUEST_INTERVAL,
        }
    }

    fn context_limit(&self, _model: &str) -> usize {
        200_000
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        (dec!(0.000003), dec!(0.000015))
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

        let (system, turns) = split_system(messages);
        let request = MessagesRequest {
            model: model.clone(),
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages: turns,
            temperature: options.temperature,
        };

        let response = self
            .send_request(&request, options.timeout.unwrap_or(DEFAULT_DEADLINE))
            .await?;

        let content = response
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        let finish_reason = match response.stop_reason.as_deref() {
            Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
            Some("max_tokens") => FinishReason::Length,
            Some("refusal") => FinishReason::ContentFilter,
            _ => FinishReason::Unknown,
        };

        Ok(Completion {
            content,
            model: response.model,
            usage: response.usage.map(|u| TokenUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            }),
            finish_reason,
        })
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/v1/models", self.config.base_url);
        let probe = self
            .client
            .get(&url)
            .header("x-api-key", self.api_key())
            .header("anthropic-version", API_VERSION)
            .send();

        match tokio::time::timeout(Duration::from_secs(5), probe).await {
            Ok(Ok(response)) => response.status().is_success(),
            _ => false,
        }
    }
}

/// The messages API takes the system prompt as a top-level field, not a
/// message; assistant/user turns pass through in order.
fn split_system(messages: &[ChatMessage]) -> (Option<String>, Vec<MessagesTurn>) {
    let mut system_parts = Vec::new();
    let mut turns = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => system_parts.push(msg.content.clone()),
            Role::User => turns.push(MessagesTurn {
                role: "user",
                content: msg.content.clone(),
            }),
            Role::Assistant => turns.push(MessagesTurn {
                role: "assistant",
                content: msg.content.clone(),
            }),
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, turns)
}

// Messages API wire types.

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<MessagesTurn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct MessagesTurn {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_lift_to_top_level() {
        let messages = vec![
            ChatMessage::system("be terse"),
            ChatMessage::user("hello"),
            ChatMessage::assistant("hi"),
            ChatMessage::user("bye"),
        ];
        let (system, turns) = split_system(&messages);
        assert_eq!(system.as_deref(), Some("be terse"));
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role, "user");
        assert_eq!(turns[1].role, "assistant");
    }

    #[test]
    fn multiple_system_messages_join() {
        let messages = vec![
            ChatMessage::system("one"),
            ChatMessage::system("two"),
            ChatMessage::user("q"),
        ];
        let (system, turns) = split_system(&messages);
        assert_eq!(system.as_deref(), Some("one\n\ntwo"));
        assert_eq!(turns.len(), 1);
    }

    #[test]
    fn no_system_message_leaves_field_unset() {
        let (system, _) = split_system(&[ChatMessage::user("q")]);
        assert!(system.is_none());
    }

    #[test]
    fn response_parses_text_blocks() {
        let raw = r#"{"model": "claude-sonnet-4-20250514",
                      "content": [{"type": "text", "text": "hel"}, {"type": "text", "text": "lo"}],
                      "stop_reason": "end_turn",
                      "usage": {"input_tokens": 9, "output_tokens": 2}}"#;
        let response: MessagesResponse = serde_json::from_str(raw).unwrap();
        let text: String = response
            .content
            .iter()
            .filter_map(|b| b.text.as_deref())
            .collect();
        assert_eq!(text, "hello");
        assert_eq!(response.usage.unwrap().input_tokens, 9);
    }
}
