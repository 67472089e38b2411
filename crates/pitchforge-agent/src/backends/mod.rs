/// Anthropic Messages API.
pub mod claude;
/// OpenAI-compatible chat completions.
pub mod openai;

use async_trait::async_trait;
use pitchforge_core::{PitchError, PitchResult};
use serde::{Deserialize, Serialize};

/// Sampling parameters for one completion. `None` falls back to the model
/// config's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Completion length limit.
    pub max_tokens: Option<u32>,
}

/// A single-turn completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Role instructions sent ahead of the prompt.
    pub system_prompt: Option<String>,
    /// User prompt.
    pub prompt: String,
    /// Sampling overrides.
    pub params: CompletionParams,
}

impl CompletionRequest {
    /// Request with no system prompt and default sampling.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: None,
            prompt: prompt.into(),
            params: CompletionParams::default(),
        }
    }

    /// Set the system prompt.
    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Set the sampling parameters.
    pub fn with_params(mut self, params: CompletionParams) -> Self {
        self.params = params;
        self
    }
}

/// Trait for LLM provider backends.
///
/// This is the only place network or provider failures originate; every
/// implementation maps them into the pipeline's error taxonomy.
///
/// To add a new provider:
/// 1. Create a new module in `backends/`
/// 2. Implement `LlmBackend` for your struct
/// 3. Add the variant to `LlmProvider` in `config.rs`
/// 4. Wire it up in `LlmClient::new()` in `llm.rs`
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Complete `request`, returning the model's text.
    async fn complete(&self, request: &CompletionRequest) -> PitchResult<String>;
}

/// Map a non-success HTTP status to an error kind.
pub(crate) fn status_error(provider: &str, status: reqwest::StatusCode, body: &str) -> PitchError {
    let msg = format!("{provider} API error {status}: {body}");
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        PitchError::ProviderUnavailable(msg)
    } else if status == reqwest::StatusCode::REQUEST_TIMEOUT {
        PitchError::Timeout(msg)
    } else {
        PitchError::InputInvalid(msg)
    }
}

/// Map a transport failure to an error kind.
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> PitchError {
    if err.is_timeout() {
        PitchError::Timeout(format!("{provider} request timed out: {err}"))
    } else if err.is_decode() {
        PitchError::InvalidResponse(format!("{provider} returned an unreadable body: {err}"))
    } else {
        PitchError::ProviderUnavailable(format!("{provider} unreachable: {err}"))
    }
}
