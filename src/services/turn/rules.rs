use crate::models::{SlotState, Stage, TurnResult};

/// First-turn text the webhook layer submits when a call is answered,
/// before the caller has said anything.
pub const CALL_START_SENTINEL: &str = "The call has just started.";

/// Name used when the caller's answer is nothing but a conversational
/// prefix ("my name is...") with no name behind it.
const DEFAULT_NAME: &str = "Caller";

/// Conversational lead-ins stripped from the start of a name answer.
const NAME_PREFIXES: &[&str] = &[
    "my name is",
    "this is",
    "i am",
    "i'm",
    "it is",
    "it's",
    "name is",
];

/// Deterministic turn engine: fills the first unmet slot (at most one per
/// turn, in fixed order) and produces the next prompt. Total and pure; this
/// is the availability floor when the generative engine is unreachable.
pub fn next_turn(state: &SlotState, utterance: &str) -> TurnResult {
    let mut state = state.clone();
    let text = normalize(utterance);
    let text = if text.eq_ignore_ascii_case(&normalize(CALL_START_SENTINEL)) {
        String::new()
    } else {
        text
    };

    if state.name.is_none() {
        if text.is_empty() {
            return TurnResult {
                stage: Stage::AskName,
                state,
                reply: "Hello! Thanks for calling. May I have your name, please?".to_string(),
            };
        }
        let name = extract_name(&text);
        let reply = format!("Thanks, {name}. What service would you like to book?");
        state.name = Some(name);
        return TurnResult {
            stage: Stage::AskService,
            state,
            reply,
        };
    }

    if state.service_type.is_none() {
        if text.is_empty() {
            return TurnResult {
                stage: Stage::AskService,
                state,
                reply: "What service would you like to book?".to_string(),
            };
        }
        let reply = format!("Got it, {text}. What date and time would you like?");
        state.service_type = Some(text);
        return TurnResult {
            stage: Stage::AskDateTime,
            state,
            reply,
        };
    }

    if state.date_time.is_none() {
        if text.is_empty() {
            return TurnResult {
                stage: Stage::AskDateTime,
                state,
                reply: "What date and time would you like for your appointment?".to_string(),
            };
        }
        state.date_time = Some(text);
        return TurnResult {
            stage: Stage::AskPhone,
            state,
            reply: "Noted. What's the best phone number to reach you on?".to_string(),
        };
    }

    if state.phone.is_none() {
        if text.is_empty() {
            return TurnResult {
                stage: Stage::AskPhone,
                state,
                reply: "What's the best phone number to reach you on?".to_string(),
            };
        }
        state.phone = Some(text);
        state.confirmed = true;
        let reply = format!(
            "Let me confirm: {} booked {} on {}, phone {}. I'll send the details to the business. Goodbye!",
            state.name.as_deref().unwrap_or(DEFAULT_NAME),
            state.service_type.as_deref().unwrap_or(""),
            state.date_time.as_deref().unwrap_or(""),
            state.phone.as_deref().unwrap_or(""),
        );
        return TurnResult {
            stage: Stage::Confirm,
            state,
            reply,
        };
    }

    // All four slots already set: terminal, idempotent.
    state.confirmed = true;
    let reply = format!(
        "Your {} appointment on {} is already recorded. Goodbye!",
        state.service_type.as_deref().unwrap_or(""),
        state.date_time.as_deref().unwrap_or(""),
    );
    TurnResult {
        stage: Stage::Done,
        state,
        reply,
    }
}

/// Trim surrounding whitespace and trailing sentence punctuation.
fn normalize(utterance: &str) -> String {
    utterance
        .trim()
        .trim_end_matches(['.', ',', '!', '?'])
        .trim()
        .to_string()
}

/// Strip one conversational prefix ("my name is", "this is", ...) from the
/// front of a name answer, case-insensitively.
fn extract_name(text: &str) -> String {
    let lower = text.to_lowercase();
    for prefix in NAME_PREFIXES {
        if let Some(rest) = lower.strip_prefix(prefix) {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                let name = normalize(&text[prefix.len()..]);
                if name.is_empty() {
                    return DEFAULT_NAME.to_string();
                }
                return name;
            }
        }
    }
    text.to_string()
}
