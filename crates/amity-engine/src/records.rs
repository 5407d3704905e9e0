//! Conversions from store rows into domain models.

use amity_db::models::{CharacterRow, FavorabilityRow, MessageRow, UserRow};
use amity_types::models::{
    AffinityLevel, Character, ChatMessage, Favorability, OtherSettings, PersonaSettings, User,
};
use tracing::warn;

use crate::affinity;

pub fn user(row: UserRow) -> User {
    User {
        id: row.id,
        username: row.username,
        created_at: row.created_at,
        last_active: row.last_active,
    }
}

/// Unparseable `other_setting` JSON degrades to empty settings.
pub fn character(row: CharacterRow) -> Character {
    let other_setting = match serde_json::from_str::<OtherSettings>(&row.other_setting) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("Character {}: unreadable other_setting: {}", row.id, e);
            OtherSettings::default()
        }
    };

    Character {
        id: row.id,
        user_id: row.user_id,
        persona: PersonaSettings {
            name: row.name,
            gender: row.gender,
            identity: row.identity,
            nickname: row.nickname,
            detail_setting: row.detail_setting,
            other_setting,
            knowledge_base_id: row.knowledge_base_id,
        },
        created_at: row.created_at,
    }
}

pub fn message(row: MessageRow) -> ChatMessage {
    let affinity_level = AffinityLevel::try_from(row.affinity_level).unwrap_or_else(|e| {
        warn!("Message {}: {}", row.id, e);
        AffinityLevel::Level1
    });

    ChatMessage {
        id: row.id,
        character_id: row.character_id,
        user_id: row.user_id,
        speaker_name: row.speaker_name,
        from_user: row.from_user,
        content: row.content,
        created_at: row.created_at,
        affinity_level,
    }
}

/// The stored level is re-derived from the counter when it is out of range.
pub fn favorability(row: FavorabilityRow) -> Favorability {
    Favorability {
        character_id: row.character_id,
        message_count: row.message_count,
        current_level: stored_level(&row),
        last_updated: row.last_updated,
    }
}

pub fn stored_level(row: &FavorabilityRow) -> AffinityLevel {
    AffinityLevel::try_from(row.current_level).unwrap_or_else(|e| {
        warn!("Character {}: {}", row.character_id, e);
        affinity::level_for(row.message_count)
    })
}
