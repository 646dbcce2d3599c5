use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::LanguageModel;
use crate::error::{PipelineError, Result};

const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI chat-completions client constrained to strict structured output.
pub struct OpenAiModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiModel {
    pub fn new(api_key: String, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: model.into(),
        }
    }

    /// Reads `OPENAI_API_KEY` from the environment.
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")?;
        Ok(Self::new(api_key, model))
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn generate_structured(
        &self,
        system: &str,
        user: &str,
        schema: &Value,
        temperature: f32,
    ) -> Result<Value> {
        let request = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": temperature,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "structured_response",
                    "strict": true,
                    "schema": schema,
                }
            }
        });

        let response = self
            .client
            .post(OPENAI_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Extraction(format!(
                "OpenAI returned {}: {}",
                status, body
            )));
        }

        let body: Value = response.json().await?;
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                PipelineError::Extraction("Model response missing content".to_string())
            })?;

        let value: Value = serde_json::from_str(content)?;
        debug!(model = %self.model, "Structured response parsed");
        Ok(value)
    }
}
