use async_trait::async_trait;
use serde_json::json;

use super::{LlmError, LlmProvider, Message};

/// OpenAI-compatible chat completions provider. The base URL is
/// configurable so the same provider serves OpenAI, Groq, or any
/// API-compatible gateway.
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            api_key,
            base_url,
            model,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> Result<String, LlmError> {
        let mut chat_messages = vec![json!({
            "role": "system",
            "content": system_prompt,
        })];

        for msg in messages {
            chat_messages.push(json!({
                "role": msg.role,
                "content": msg.content,
            }));
        }

        let body = json!({
            "model": self.model,
            "messages": chat_messages,
            "temperature": 0.3,
            "response_format": {"type": "json_object"},
        });

        let resp = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Upstream { status, body });
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| LlmError::Schema(format!("response body is not JSON: {e}")))?;

        data["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| LlmError::Schema("missing choices[0].message.content".to_string()))
    }
}
