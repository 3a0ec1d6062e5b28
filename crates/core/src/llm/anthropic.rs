use crate::config::LlmConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::llm::ChatProvider;
use serde_json::json;

/// Chat transport for the Anthropic messages API (`{base_url}/v1/messages`).
pub struct AnthropicProvider {
    client: reqwest::Client,
    model: String,
    base_url: String,
    auth_token: String,
    version: String,
}

impl AnthropicProvider {
    pub fn new(client: reqwest::Client, config: &LlmConfig) -> Self {
        let auth_token = if config.anthropic_auth_token.is_empty() {
            config.api_key.clone()
        } else {
            config.anthropic_auth_token.clone()
        };
        Self {
            client,
            model: config.model.clone(),
            base_url: config.anthropic_base_url.clone(),
            auth_token,
            version: config.anthropic_version.clone(),
        }
    }
}

#[async_trait::async_trait]
impl ChatProvider for AnthropicProvider {
    async fn complete(&self, system: &str, user: &str) -> PipelineResult<String> {
        if self.auth_token.is_empty() {
            return Err(PipelineError::LlmOutputInvalid(
                "missing anthropic auth token".to_string(),
            ));
        }

        let payload = json!({
            "model": self.model,
            "max_tokens": 1200,
            "temperature": 0.1,
            "system": system,
            "messages": [{"role": "user", "content": user}],
        });

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.auth_token)
            .header("anthropic-version", &self.version)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PipelineError::Other(format!("llm request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::LlmApi {
                status: status.as_u16(),
                detail: body.chars().take(500).collect(),
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::LlmOutputInvalid(format!("invalid response body: {e}")))?;

        let blocks = data["content"].as_array().cloned().unwrap_or_default();
        let text_parts: Vec<String> = blocks
            .iter()
            .filter(|b| b["type"].as_str() == Some("text"))
            .filter_map(|b| b["text"].as_str())
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();

        Ok(text_parts.join("\n").trim().to_string())
    }

    fn provider_name(&self) -> &str {
        "anthropic"
    }
}
