use crate::config::LlmConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::llm::ChatProvider;
use serde_json::json;

/// Chat transport for OpenAI-compatible providers (`{base_url}/chat/completions`).
pub struct OpenAiProvider {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(client: reqwest::Client, config: &LlmConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait::async_trait]
impl ChatProvider for OpenAiProvider {
    async fn complete(&self, system: &str, user: &str) -> PipelineResult<String> {
        if self.api_key.is_empty() {
            return Err(PipelineError::LlmOutputInvalid(
                "missing llm api key".to_string(),
            ));
        }

        let payload = json!({
            "model": self.model,
            "temperature": 0.1,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
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

        Ok(data["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    fn provider_name(&self) -> &str {
        "openai"
    }
}
