use serde_json::json;

use crate::models::{SlotState, TurnResult};
use crate::services::ai::{LlmError, LlmProvider, Message};

/// The dialogue policy sent as the system instruction. Its wording is a
/// contract with the model's output schema; treat changes as versioned.
pub const DIALOGUE_POLICY: &str = r#"You are an AI voice agent that books appointments for businesses over the phone.
You must follow this process:
1. Greet the caller and say which business you're representing.
2. Collect: caller name, service type, preferred date and time, and phone number (if not obvious).
3. Confirm the details clearly in one short sentence.
4. Then say you'll send the details to the business and end the call politely.

You must always respond in short, clear sentences suitable for text-to-speech.
Output in JSON with keys: "stage", "state", "reply".
The "stage" must be one of: ask_name, ask_service, ask_date_time, ask_phone, confirm, done.
The "state" must contain keys: name, service_type, date_time, phone, confirmed (true/false).
"#;

/// One generative turn: hand the current slot state and the caller's latest
/// utterance to the model and parse its structured reply. Extraction quality
/// is the model's job; only structural well-formedness is checked here. Any
/// failure propagates so the orchestrator can fall back.
pub async fn next_turn(
    llm: &dyn LlmProvider,
    state: &SlotState,
    utterance: &str,
) -> Result<TurnResult, LlmError> {
    let user_content = json!({
        "current_state": state,
        "latest_user_utterance": utterance,
    });

    let messages = [Message {
        role: "user".to_string(),
        content: user_content.to_string(),
    }];

    let response = llm.chat(DIALOGUE_POLICY, &messages).await?;

    parse_turn_response(&response)
}

/// Parse the model's reply into a TurnResult: direct parse first, then with
/// markdown code fences stripped, then the first embedded JSON object.
/// Anything else is a schema violation.
fn parse_turn_response(response: &str) -> Result<TurnResult, LlmError> {
    if let Ok(result) = serde_json::from_str::<TurnResult>(response) {
        return Ok(result);
    }

    let cleaned = response
        .trim()
        .strip_prefix("```json")
        .or_else(|| response.trim().strip_prefix("```"))
        .unwrap_or(response.trim());
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Ok(result) = serde_json::from_str::<TurnResult>(cleaned) {
        return Ok(result);
    }

    if let Some(start) = cleaned.find('{') {
        if let Some(end) = cleaned.rfind('}') {
            if let Ok(result) = serde_json::from_str::<TurnResult>(&cleaned[start..=end]) {
                return Ok(result);
            }
        }
    }

    Err(LlmError::Schema(format!(
        "reply does not match the turn schema: {}",
        response.chars().take(200).collect::<String>()
    )))
}
