pub mod generative;
pub mod rules;

pub use rules::CALL_START_SENTINEL;

use crate::models::{SlotState, TurnResult};
use crate::services::ai::LlmProvider;

/// Public entry point for one dialogue turn. Tries the generative engine
/// when a provider is configured and falls back to the rule-based engine on
/// any failure, so a result is always produced. Holds no per-session state.
pub struct TurnEngine {
    llm: Option<Box<dyn LlmProvider>>,
}

impl TurnEngine {
    pub fn new(llm: Option<Box<dyn LlmProvider>>) -> Self {
        Self { llm }
    }

    pub fn rules_only() -> Self {
        Self { llm: None }
    }

    /// Total: never errors. Exactly one engine's output is returned per
    /// call; at most one generative attempt, then fallback.
    pub async fn turn(&self, state: Option<SlotState>, utterance: &str) -> TurnResult {
        let state = state.unwrap_or_default();

        let Some(llm) = &self.llm else {
            return rules::next_turn(&state, utterance);
        };

        match generative::next_turn(llm.as_ref(), &state, utterance).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "generative turn failed, falling back to rules");
                rules::next_turn(&state, utterance)
            }
        }
    }
}
