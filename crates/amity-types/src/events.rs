use serde::{Deserialize, Serialize};

use crate::models::AffinityLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialEventKind {
    Milestone,
    Anniversary,
    LevelUp,
}

/// The datum that triggered a special event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventData {
    Count { count: u64 },
    Days { days: u32 },
    Level { level: AffinityLevel },
}

/// A celebratory event recognized at the end of a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialEvent {
    #[serde(rename = "type")]
    pub kind: SpecialEventKind,
    pub message: String,
    pub data: EventData,
}

impl SpecialEvent {
    pub fn milestone(count: u64, message: String) -> Self {
        Self {
            kind: SpecialEventKind::Milestone,
            message,
            data: EventData::Count { count },
        }
    }

    pub fn anniversary(days: u32, message: String) -> Self {
        Self {
            kind: SpecialEventKind::Anniversary,
            message,
            data: EventData::Days { days },
        }
    }

    pub fn level_up(level: AffinityLevel, message: String) -> Self {
        Self {
            kind: SpecialEventKind::LevelUp,
            message,
            data: EventData::Level { level },
        }
    }
}

/// Local time-of-day facts for the turn, in the configured UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeContext {
    pub hour: u32,
    pub is_morning: bool,
    pub is_afternoon: bool,
    pub is_evening: bool,
    pub is_night: bool,
    pub is_weekend: bool,
}

/// Token accounting reported by the completion service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub knowledge_tokens: u64,
    pub total_tokens: u64,
}

/// Outcome of one successful conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResult {
    pub reply: String,
    #[serde(rename = "favorability_level")]
    pub level: AffinityLevel,
    pub level_increased: bool,
    pub message_count: u64,
    #[serde(rename = "special_messages")]
    pub special_events: Vec<SpecialEvent>,
    pub time_context: TimeContext,
    pub usage: TokenUsage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn special_event_wire_shape() {
        let event = SpecialEvent::milestone(50, "hi".into());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "milestone");
        assert_eq!(json["data"]["count"], 50);

        let event = SpecialEvent::level_up(AffinityLevel::Level3, "yay".into());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "level_up");
        assert_eq!(json["data"]["level"], 3);
    }

    #[test]
    fn event_data_parses_by_key() {
        let data: EventData = serde_json::from_str(r#"{"days":7}"#).unwrap();
        assert_eq!(data, EventData::Days { days: 7 });
    }
}
