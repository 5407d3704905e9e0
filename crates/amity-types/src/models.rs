use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Relationship closeness between a user and one of their characters.
///
/// Serialized as the bare integer `1`, `2` or `3`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum AffinityLevel {
    /// Stranger (陌生期)
    #[default]
    Level1 = 1,
    /// Familiar (熟悉期)
    Level2 = 2,
    /// Intimate (親密期)
    Level3 = 3,
}

impl AffinityLevel {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Display name used in exports and analytics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Level1 => "陌生期",
            Self::Level2 => "熟悉期",
            Self::Level3 => "親密期",
        }
    }
}

impl From<AffinityLevel> for u8 {
    fn from(level: AffinityLevel) -> u8 {
        level.as_u8()
    }
}

impl TryFrom<u8> for AffinityLevel {
    type Error = InvalidLevel;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Level1),
            2 => Ok(Self::Level2),
            3 => Ok(Self::Level3),
            other => Err(InvalidLevel(other)),
        }
    }
}

impl fmt::Display for AffinityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidLevel(pub u8);

impl fmt::Display for InvalidLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "affinity level must be 1, 2 or 3 (got {})", self.0)
    }
}

impl std::error::Error for InvalidLevel {}

/// Structured "other settings" payload of a persona: background story,
/// interests and response-style directives. Unknown keys are preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtherSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_story: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interests: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub communication_style: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub response_guidelines: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Everything that describes a generated character to the completion service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonaSettings {
    pub name: String,
    pub gender: String,
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub detail_setting: Option<String>,
    #[serde(default)]
    pub other_setting: OtherSettings,
    #[serde(default)]
    pub knowledge_base_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub id: i64,
    pub user_id: i64,
    #[serde(flatten)]
    pub persona: PersonaSettings,
    pub created_at: DateTime<Utc>,
}

/// One persisted line of a conversation. `from_user` says who spoke;
/// `speaker_name` is the display name at the time it was last written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub character_id: i64,
    pub user_id: i64,
    pub speaker_name: String,
    pub from_user: bool,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub affinity_level: AffinityLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Favorability {
    pub character_id: i64,
    pub message_count: u64,
    pub current_level: AffinityLevel,
    pub last_updated: DateTime<Utc>,
}
