use crate::backends::claude::ClaudeBackend;
use crate::backends::openai::OpenAiBackend;
use crate::backends::{CompletionRequest, LlmBackend};
use crate::config::{LlmProvider, ModelConfig};
use crate::failover::FailoverBackend;
use pitchforge_core::PitchResult;

fn backend_for(config: ModelConfig) -> Box<dyn LlmBackend> {
    match config.provider {
        LlmProvider::Claude => Box::new(ClaudeBackend::new(config)),
        LlmProvider::OpenAi | LlmProvider::OpenRouter | LlmProvider::Groq => {
            Box::new(OpenAiBackend::new(config))
        }
    }
}

/// LLM client that dispatches to the correct provider backend.
///
/// When the config names fallback models or a retry policy, the primary and
/// fallbacks are wrapped in a [`FailoverBackend`].
pub struct LlmClient {
    backend: Box<dyn LlmBackend>,
}

impl LlmClient {
    /// Client for `config`, wrapped in failover when it names fallbacks or a retry policy.
    pub fn new(mut config: ModelConfig) -> Self {
        let fallbacks = std::mem::take(&mut config.fallback_models);
        let policy = config.retry_policy.clone();

        if fallbacks.is_empty() && policy.is_none() {
            return Self {
                backend: backend_for(config),
            };
        }

        let failover = FailoverBackend::with_primary(
            backend_for(config),
            fallbacks.into_iter().map(backend_for).collect(),
            policy.unwrap_or_default(),
        );
        Self {
            backend: Box::new(failover),
        }
    }

    /// Create from a pre-built backend (for custom providers and tests).
    pub fn from_backend(backend: Box<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    /// Send one completion request.
    pub async fn complete(&self, request: &CompletionRequest) -> PitchResult<String> {
        self.backend.complete(request).await
    }
}
