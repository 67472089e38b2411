use crate::failover::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Supported model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Anthropic Messages API.
    Claude,
    /// OpenAI chat completions.
    OpenAi,
    /// OpenRouter, OpenAI-compatible API.
    OpenRouter,
    /// Groq cloud inference, OpenAI-compatible API.
    Groq,
}

/// Configuration for one model, with optional fallbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider to call.
    pub provider: LlmProvider,
    /// Provider model name.
    pub model_id: String,
    /// API key. Empty means the provider's env var is read at startup.
    #[serde(default)]
    pub api_key: String,
    /// Override of the provider's default endpoint.
    pub api_base_url: Option<String>,
    /// Default sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Default completion length limit.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// HTTP-level timeout for one provider call. Stage deadlines are usually
    /// tighter and apply on top of this.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Models tried in order when this one fails.
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    /// Backoff between fallback attempts.
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_request_timeout_secs() -> u64 {
    180
}

impl ModelConfig {
    /// Config with default sampling, no fallbacks and no base URL override.
    pub fn new(provider: LlmProvider, model_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            model_id: model_id.into(),
            api_key: api_key.into(),
            api_base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            fallback_models: Vec::new(),
            retry_policy: None,
        }
    }

    /// Endpoint to call: the override or the provider default.
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url
        } else {
            match self.provider {
                LlmProvider::Claude => "https://api.anthropic.com",
                LlmProvider::OpenAi => "https://api.openai.com",
                LlmProvider::OpenRouter => "https://openrouter.ai/api",
                LlmProvider::Groq => "https://api.groq.com/openai",
            }
        }
    }

    /// Environment variable conventionally holding this provider's key.
    pub fn api_key_env(&self) -> &'static str {
        match self.provider {
            LlmProvider::Claude => "ANTHROPIC_API_KEY",
            LlmProvider::OpenAi => "OPENAI_API_KEY",
            LlmProvider::OpenRouter => "OPENROUTER_API_KEY",
            LlmProvider::Groq => "GROQ_API_KEY",
        }
    }
}
