//! Multi-provider manager: ordered failover, task routing, and ensemble
//! analysis.
//!
//! Wraps the configured [`ChatAdapter`]s and tries them in preference
//! order across multiple passes. Transparent to callers: every success is
//! tagged with the adapter that served it.

use std::sync::Arc;

use futures::future::join_all;

use crate::config::ProvidersConfig;
use crate::error::ProviderError;
use crate::llm::adapter::{
    ChatAdapter, ChatMessage, Completion, CompletionOptions, estimated_cost,
};
use crate::llm::analysis::{
    AnalysisFinding, AnalysisRequest, ConsensusFinding, ModificationProposal, ModificationRequest,
    analysis_messages, modification_messages, parse_finding, parse_proposal,
};
use crate::llm::anthropic::AnthropicAdapter;
use crate::llm::compat::CompatAdapter;
use crate::llm::ensemble;
use crate::llm::openai::OpenAiAdapter;
use crate::llm::retry::pass_delay;

/// Maximum adapters consulted by one ensemble call.
const ENSEMBLE_FAN_OUT: usize = 3;

/// Temperature used for analysis and modification requests.
const REVIEW_TEMPERATURE: f32 = 0.2;

/// What the completion is for; selects a fixed provider preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Analysis,
    Modification,
}

impl TaskKind {
    fn preference_order(&self) -> &'static [&'static str] {
        match self {
            TaskKind::Analysis => &["anthropic", "openai", "local"],
            TaskKind::Modification => &["openai", "anthropic", "local"],
        }
    }
}

/// Failover policy for one completion.
#[derive(Debug, Clone, Default)]
pub struct CompletionPolicy {
    /// Adapter tried first.
    pub preferred: Option<String>,
    /// Adapters tried after the preferred one, before the remainder.
    pub fallbacks: Vec<String>,
    /// Number of full passes over the adapter order.
    pub max_retries: u32,
}

impl CompletionPolicy {
    pub fn with_preferred(name: impl Into<String>) -> Self {
        Self {
            preferred: Some(name.into()),
            fallbacks: Vec::new(),
            max_retries: 2,
        }
    }
}

/// A completion tagged with the adapter that produced it.
#[derive(Debug, Clone)]
pub struct TaggedCompletion {
    pub provider: String,
    pub completion: Completion,
}

/// Owns the adapters and routes requests across them.
pub struct ProviderManager {
    adapters: Vec<Arc<dyn ChatAdapter>>,
}

impl ProviderManager {
    /// Create a manager over an explicit adapter list.
    pub fn new(adapters: Vec<Arc<dyn ChatAdapter>>) -> Self {
        Self { adapters }
    }

    /// Build adapters for every backend with credentials configured.
    pub fn from_config(providers: &ProvidersConfig) -> Self {
        let mut adapters: Vec<Arc<dyn ChatAdapter>> = Vec::new();
        if let Some(cfg) = &providers.openai {
            adapters.push(Arc::new(OpenAiAdapter::new(cfg.clone())));
        }
        if let Some(cfg) = &providers.anthropic {
            adapters.push(Arc::new(AnthropicAdapter::new(cfg.clone())));
        }
        if let Some(cfg) = &providers.local {
            adapters.push(Arc::new(CompatAdapter::new(cfg.clone())));
        }
        Self { adapters }
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn adapter_names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }

    pub fn adapters(&self) -> &[Arc<dyn ChatAdapter>] {
        &self.adapters
    }

    /// Adapter order for one request: preferred, then fallbacks, then the
    /// remaining adapters in registration order.
    fn ordered(&self, policy: &CompletionPolicy) -> Vec<Arc<dyn ChatAdapter>> {
        let mut order: Vec<Arc<dyn ChatAdapter>> = Vec::with_capacity(self.adapters.len());
        let mut push_by_name = |order: &mut Vec<Arc<dyn ChatAdapter>>, name: &str| {
            if order.iter().any(|a| a.name() == name) {
                return;
            }
            if let Some(adapter) = self.adapters.iter().find(|a| a.name() == name) {
                order.push(Arc::clone(adapter));
            }
        };

        if let Some(preferred) = &policy.preferred {
            push_by_name(&mut order, preferred);
        }
        for name in &policy.fallbacks {
            push_by_name(&mut order, name);
        }
        for adapter in &self.adapters {
            if !order.iter().any(|a| a.name() == adapter.name()) {
                order.push(Arc::clone(adapter));
            }
        }
        order
    }

    /// Run one completion with cross-adapter failover.
    ///
    /// For up to `max_retries` passes, each adapter is tried in order.
    /// `RateLimited` advances to the next adapter immediately; other
    /// failures advance after logging. Passes are separated by a delay
    /// that grows linearly with the pass index. The first success wins,
    /// tagged with its adapter name.
    pub async fn generate_completion(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
        policy: &CompletionPolicy,
    ) -> Result<TaggedCompletion, ProviderError> {
        if self.adapters.is_empty() {
            return Err(ProviderError::NoProvidersConfigured);
        }

        let order = self.ordered(policy);
        let passes = policy.max_retries.max(1);
        let mut attempts = 0usize;

        for pass in 0..passes {
            for adapter in &order {
                attempts += 1;
                match adapter.complete(messages, options).await {
                    Ok(completion) => {
                        if let Some(usage) = &completion.usage {
                            let cost = estimated_cost(usage, adapter.cost_per_token());
                            tracing::debug!(
                                provider = adapter.name(),
                                input_tokens = usage.input_tokens,
                                output_tokens = usage.output_tokens,
                                cost = %cost,
                                "completion served"
                            );
                        }
                        return Ok(TaggedCompletion {
                            provider: adapter.name().to_string(),
                            completion,
                        });
                    }
                    Err(ProviderError::RateLimited { provider, retry_in }) => {
                        tracing::debug!(
                            provider,
                            retry_in = ?retry_in,
                            "adapter rate limited, advancing"
                        );
                    }
                    Err(err) => {
                        tracing::warn!(
                            provider = adapter.name(),
                            error = %err,
                            pass,
                            "adapter failed, advancing"
                        );
                    }
                }
            }

            if pass + 1 < passes {
                let delay = pass_delay(pass);
                tracing::debug!(pass, delay = ?delay, "all adapters failed this pass");
                tokio::time::sleep(delay).await;
            }
        }

        Err(ProviderError::AllProvidersExhausted { attempts })
    }

    /// Pick an adapter for a task using its fixed preference order,
    /// probing availability and falling back to the first adapter that
    /// answers. When nothing answers the probe, the best-placed
    /// configured adapter is returned anyway and the real request will
    /// surface the failure.
    pub async fn select_provider_for_task(
        &self,
        task: TaskKind,
    ) -> Result<Arc<dyn ChatAdapter>, ProviderError> {
        if self.adapters.is_empty() {
            return Err(ProviderError::NoProvidersConfigured);
        }

        let ranked = self.ordered(&CompletionPolicy {
            preferred: None,
            fallbacks: task
                .preference_order()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_retries: 1,
        });

        for adapter in &ranked {
            if adapter.is_available().await {
                return Ok(Arc::clone(adapter));
            }
            tracing::debug!(provider = adapter.name(), "adapter probe failed");
        }

        tracing::warn!(task = ?task, "no adapter answered the availability probe");
        Ok(Arc::clone(&ranked[0]))
    }

    /// Single-adapter code analysis: the task-selected adapter is
    /// preferred, the rest stay as failover.
    pub async fn analyze_code(
        &self,
        req: &AnalysisRequest,
    ) -> Result<(String, AnalysisFinding), ProviderError> {
        let messages = analysis_messages(req);
        let options = CompletionOptions {
            temperature: Some(REVIEW_TEMPERATURE),
            ..Default::default()
        };
        let policy = self.task_policy(TaskKind::Analysis).await?;

        let tagged = self.generate_completion(&messages, &options, &policy).await?;
        let finding = parse_finding(&tagged.provider, &tagged.completion.content)?;
        Ok((tagged.provider, finding))
    }

    /// Single-adapter rewrite proposal with failover.
    pub async fn propose_modification(
        &self,
        req: &ModificationRequest,
    ) -> Result<(String, ModificationProposal), ProviderError> {
        let messages = modification_messages(req);
        let options = CompletionOptions {
            temperature: Some(REVIEW_TEMPERATURE),
            ..Default::default()
        };
        let policy = self.task_policy(TaskKind::Modification).await?;

        let tagged = self.generate_completion(&messages, &options, &policy).await?;
        let proposal = parse_proposal(&tagged.provider, &tagged.completion.content)?;
        Ok((tagged.provider, proposal))
    }

    /// Completion policy for a task: the probed adapter first, the fixed
    /// preference order behind it.
    async fn task_policy(&self, task: TaskKind) -> Result<CompletionPolicy, ProviderError> {
        let selected = self.select_provider_for_task(task).await?;
        Ok(CompletionPolicy {
            preferred: Some(selected.name().to_string()),
            fallbacks: task
                .preference_order()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_retries: 2,
        })
    }

    /// Ask several adapters independently and merge their findings.
    ///
    /// Requires at least `min_providers` adapters configured. Individual
    /// adapter failures are tolerated as long as `min_providers` succeed.
    /// Calls are issued concurrently; each adapter's own request gate
    /// still applies.
    pub async fn ensemble_analysis(
        &self,
        req: &AnalysisRequest,
        min_providers: usize,
    ) -> Result<ConsensusFinding, ProviderError> {
        let min_providers = min_providers.max(1);
        if self.adapters.len() < min_providers {
            return Err(ProviderError::InsufficientProviders {
                required: min_providers,
                configured: self.adapters.len(),
            });
        }

        let ranked = self.ordered(&CompletionPolicy {
            preferred: None,
            fallbacks: TaskKind::Analysis
                .preference_order()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_retries: 1,
        });
        let panel: Vec<_> = ranked.into_iter().take(ENSEMBLE_FAN_OUT).collect();

        let messages = analysis_messages(req);
        let options = CompletionOptions {
            temperature: Some(REVIEW_TEMPERATURE),
            ..Default::default()
        };

        let calls = panel.iter().map(|adapter| {
            let adapter = Arc::clone(adapter);
            let messages = messages.clone();
            let options = options.clone();
            async move {
                let name = adapter.name().to_string();
                let result = adapter
                    .complete(&messages, &options)
                    .await
                    .and_then(|c| parse_finding(&name, &c.content));
                (name, result)
            }
        });

        let mut findings = Vec::new();
        for (name, result) in join_all(calls).await {
            match result {
                Ok(finding) => findings.push((name, finding)),
                Err(err) => {
                    tracing::warn!(provider = name, error = %err, "ensemble member failed");
                }
            }
        }

        if findings.len() < min_providers {
            return Err(ProviderError::EnsembleFailed {
                required: min_providers,
                succeeded: findings.len(),
            });
        }

        Ok(ensemble::merge(&findings))
    }
}
