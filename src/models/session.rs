use serde::{Deserialize, Serialize};

/// The caller's answers collected so far. Slots fill strictly in the order
/// name -> service_type -> date_time -> phone; a set slot is never cleared
/// for the rest of the call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotState {
    pub name: Option<String>,
    pub service_type: Option<String>,
    pub date_time: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub confirmed: bool,
}

impl SlotState {
    pub fn is_complete(&self) -> bool {
        self.name.is_some()
            && self.service_type.is_some()
            && self.date_time.is_some()
            && self.phone.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    AskName,
    AskService,
    AskDateTime,
    AskPhone,
    Confirm,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::AskName => "ask_name",
            Stage::AskService => "ask_service",
            Stage::AskDateTime => "ask_date_time",
            Stage::AskPhone => "ask_phone",
            Stage::Confirm => "confirm",
            Stage::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "ask_service" => Stage::AskService,
            "ask_date_time" => Stage::AskDateTime,
            "ask_phone" => Stage::AskPhone,
            "confirm" => Stage::Confirm,
            "done" => Stage::Done,
            _ => Stage::AskName,
        }
    }
}

/// Output of one dialogue turn: which question was just asked (or that the
/// flow is done), the updated slot state, and the text to speak next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    pub stage: Stage,
    pub state: SlotState,
    pub reply: String,
}

/// One phone call's persisted dialogue progress, keyed by Twilio CallSid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    pub call_sid: String,
    pub business_id: i64,
    pub state: SlotState,
    pub stage: Stage,
    pub created_at: chrono::NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_state_json_shape() {
        let state = SlotState {
            name: Some("Alex".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["name"], "Alex");
        assert!(json["service_type"].is_null());
        assert_eq!(json["confirmed"], false);
    }

    #[test]
    fn test_stage_round_trip() {
        for stage in [
            Stage::AskName,
            Stage::AskService,
            Stage::AskDateTime,
            Stage::AskPhone,
            Stage::Confirm,
            Stage::Done,
        ] {
            assert_eq!(Stage::parse(stage.as_str()), stage);
        }
    }

    #[test]
    fn test_is_complete() {
        let mut state = SlotState::default();
        assert!(!state.is_complete());
        state.name = Some("Alex".to_string());
        state.service_type = Some("haircut".to_string());
        state.date_time = Some("Friday 3pm".to_string());
        assert!(!state.is_complete());
        state.phone = Some("555-1234".to_string());
        assert!(state.is_complete());
    }
}
