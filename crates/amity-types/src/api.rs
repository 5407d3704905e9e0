use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::TurnResult;
use crate::models::{AffinityLevel, Character, ChatMessage, OtherSettings, PersonaSettings};

// -- Characters --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCharacterRequest {
    pub user_name: String,
    pub character: PersonaSettings,
    /// Opening line spoken by the character, stored as the first message.
    #[serde(default)]
    pub greeting: Option<String>,
    /// Messaging-transport identity to bind to the new character.
    #[serde(default)]
    pub line_user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateCharacterResponse {
    pub success: bool,
    pub user_id: i64,
    pub character_id: i64,
    pub character: Character,
    pub initial_message: Option<String>,
    pub favorability_level: AffinityLevel,
}

/// Partial update of a character's persona. Absent fields are left alone.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateCharacterRequest {
    pub name: Option<String>,
    pub gender: Option<String>,
    pub identity: Option<String>,
    pub nickname: Option<String>,
    pub detail_setting: Option<String>,
    pub other_setting: Option<OtherSettings>,
    pub knowledge_base_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CharacterResponse {
    pub success: bool,
    pub character: Character,
}

#[derive(Debug, Serialize)]
pub struct CharacterSummary {
    pub character_id: i64,
    pub name: String,
    pub nickname: Option<String>,
    pub created_at: DateTime<Utc>,
    pub favorability: AffinityLevel,
}

#[derive(Debug, Serialize)]
pub struct UserCharactersResponse {
    pub success: bool,
    pub user_id: i64,
    pub character_count: usize,
    pub characters: Vec<CharacterSummary>,
}

#[derive(Debug, Serialize)]
pub struct LevelThresholds {
    pub level_1_threshold: u64,
    pub level_2_threshold: u64,
    pub level_3_threshold: u64,
}

#[derive(Debug, Serialize)]
pub struct FavorabilityResponse {
    pub success: bool,
    pub character_id: i64,
    pub current_level: AffinityLevel,
    pub message_count: u64,
    pub last_updated: DateTime<Utc>,
    pub progress: LevelThresholds,
}

#[derive(Debug, Serialize)]
pub struct CharacterProfileResponse {
    pub success: bool,
    pub character: Character,
    pub favorability_level: AffinityLevel,
    pub level_name: &'static str,
    pub message_count: u64,
    pub stored_messages: u64,
    pub first_message_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub character_id: i64,
}

// -- Conversation --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub user_id: i64,
    pub character_id: i64,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub success: bool,
    #[serde(flatten)]
    pub turn: TurnResult,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub character_id: i64,
    pub message_count: usize,
    pub messages: Vec<ChatMessage>,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
}

/// Body of every failed request: `{ "success": false, "error": {...} }`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}
