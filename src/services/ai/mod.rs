pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Failure classes the turn orchestrator distinguishes when deciding to
/// fall back to the rule-based engine.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream rejected request ({status}): {body}")]
    Upstream {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("malformed response: {0}")]
    Schema(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> Result<String, LlmError>;
}
