//! Database row types. These map directly to SQLite rows and stay distinct
//! from the amity-types models so the DB layer has no domain dependencies.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CharacterRow {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub gender: String,
    pub identity: Option<String>,
    pub nickname: Option<String>,
    pub detail_setting: Option<String>,
    /// Serialized JSON object.
    pub other_setting: String,
    pub knowledge_base_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Column values for inserting or overwriting a character.
#[derive(Debug, Clone, Default)]
pub struct CharacterFields {
    pub name: String,
    pub gender: String,
    pub identity: Option<String>,
    pub nickname: Option<String>,
    pub detail_setting: Option<String>,
    pub other_setting: String,
    pub knowledge_base_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub character_id: i64,
    pub user_id: i64,
    pub speaker_name: String,
    /// True for the owning user's lines, false for the character's.
    pub from_user: bool,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub affinity_level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavorabilityRow {
    pub character_id: i64,
    pub user_id: i64,
    pub message_count: u64,
    pub current_level: u8,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TransportLinkRow {
    pub external_id: String,
    pub user_id: i64,
    pub character_id: Option<i64>,
}
