use super::{status_error, transport_error, CompletionRequest, LlmBackend};
use crate::config::ModelConfig;
use async_trait::async_trait;
use pitchforge_core::{PitchError, PitchResult};
use std::time::Duration;

/// Claude (Anthropic) API backend.
pub struct ClaudeBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl ClaudeBackend {
    /// Backend with its own HTTP client, bounded by the config's request timeout.
    pub fn new(config: ModelConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();
        Self { config, http }
    }
}

#[async_trait]
impl LlmBackend for ClaudeBackend {
    async fn complete(&self, request: &CompletionRequest) -> PitchResult<String> {
        let url = format!("{}/v1/messages", self.config.base_url());

        let mut body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": request.params.max_tokens.unwrap_or(self.config.max_tokens),
            "temperature": request.params.temperature.unwrap_or(self.config.temperature),
            "messages": [{"role": "user", "content": request.prompt}],
        });

        if let Some(sys) = &request.system_prompt {
            body["system"] = serde_json::json!(sys);
        }

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("Claude", e))?;

        let status = resp.status();
        if !status.is_success() {
            let error_body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(status_error("Claude", status, &error_body));
        }

        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| transport_error("Claude", e))?;

        parse_claude_response(&resp_body)
    }
}

/// Join the text blocks of a messages API body.
pub fn parse_claude_response(body: &serde_json::Value) -> PitchResult<String> {
    let content = body["content"]
        .as_array()
        .ok_or_else(|| PitchError::InvalidResponse("Missing content in Claude response".into()))?;

    let text_parts: Vec<&str> = content
        .iter()
        .filter(|block| block["type"].as_str() == Some("text"))
        .filter_map(|block| block["text"].as_str())
        .collect();

    if text_parts.is_empty() {
        return Err(PitchError::InvalidResponse(
            "Claude response has no text blocks".into(),
        ));
    }
    Ok(text_parts.join("\n"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_claude_response_joins_text_blocks() {
        let body = serde_json::json!({
            "content": [
                {"type": "text", "text": "TITLE: A"},
                {"type": "text", "text": "CONTENT:\nB"}
            ],
            "stop_reason": "end_turn"
        });
        assert_eq!(parse_claude_response(&body).unwrap(), "TITLE: A\nCONTENT:\nB");
    }

    #[test]
    fn test_parse_claude_response_without_text() {
        let body = serde_json::json!({"content": []});
        assert!(parse_claude_response(&body).is_err());
        assert!(parse_claude_response(&serde_json::json!({})).is_err());
    }
}
