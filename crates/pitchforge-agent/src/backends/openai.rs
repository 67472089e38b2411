use super::{status_error, transport_error, CompletionRequest, LlmBackend};
use crate::config::{LlmProvider, ModelConfig};
use async_trait::async_trait;
use pitchforge_core::{PitchError, PitchResult};
use std::time::Duration;

/// OpenAI-compatible API backend.
///
/// Works with OpenAI, OpenRouter, Groq, Ollama, and any other provider
/// that implements the OpenAI chat completions API.
pub struct OpenAiBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OpenAiBackend {
    /// Backend with its own HTTP client, bounded by the config's request timeout.
    pub fn new(config: ModelConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();
        Self { config, http }
    }

    fn build_messages(&self, request: &CompletionRequest) -> Vec<serde_json::Value> {
        let mut api_messages = Vec::with_capacity(2);
        if let Some(sys) = &request.system_prompt {
            api_messages.push(serde_json::json!({
                "role": "system",
                "content": sys
            }));
        }
        api_messages.push(serde_json::json!({
            "role": "user",
            "content": request.prompt
        }));
        api_messages
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json");

        // OpenRouter requires extra headers
        if matches!(self.config.provider, LlmProvider::OpenRouter) {
            request.header("X-Title", "pitchforge")
        } else {
            request
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn complete(&self, request: &CompletionRequest) -> PitchResult<String> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());

        let body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": request.params.max_tokens.unwrap_or(self.config.max_tokens),
            "temperature": request.params.temperature.unwrap_or(self.config.temperature),
            "messages": self.build_messages(request),
        });

        let resp = self
            .add_provider_headers(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("OpenAI", e))?;

        let status = resp.status();
        if !status.is_success() {
            let error_body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(status_error("OpenAI", status, &error_body));
        }

        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| transport_error("OpenAI", e))?;

        parse_openai_response(&resp_body)
    }
}

/// Extract the assistant text from a chat completions body.
pub fn parse_openai_response(body: &serde_json::Value) -> PitchResult<String> {
    let content = body["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| {
            PitchError::InvalidResponse("Missing choices[0].message.content in OpenAI response".into())
        })?;
    Ok(content.to_string())
}
