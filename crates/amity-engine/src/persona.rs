//! Persona validation and patching. Lengths count characters, not bytes.

use amity_db::models::CharacterFields;
use amity_types::api::UpdateCharacterRequest;
use amity_types::models::PersonaSettings;

use crate::error::{EngineError, EngineResult};

pub const NAME_MAX: usize = 50;
pub const GENDER_MAX: usize = 50;
pub const IDENTITY_MAX: usize = 200;
pub const NICKNAME_MAX: usize = 50;
pub const DETAIL_MAX: usize = 500;
pub const OTHER_SETTING_MAX: usize = 2000;
pub const USER_NAME_MAX: usize = 50;

fn required(field: &str, value: &str, max: usize) -> EngineResult<()> {
    if value.trim().is_empty() {
        return Err(EngineError::Validation(format!("{} must not be empty", field)));
    }
    bounded(field, Some(value), max)
}

fn bounded(field: &str, value: Option<&str>, max: usize) -> EngineResult<()> {
    let len = value.map(|v| v.chars().count()).unwrap_or(0);
    if len > max {
        return Err(EngineError::Validation(format!(
            "{} is {} characters long (max {})",
            field, len, max
        )));
    }
    Ok(())
}

pub fn validate_user_name(name: &str) -> EngineResult<()> {
    required("user_name", name, USER_NAME_MAX)
}

/// A character may not share its owner's name; both appear side by side in
/// the upstream dialogue.
pub fn ensure_distinct_from_user(character_name: &str, user_name: &str) -> EngineResult<()> {
    if character_name.trim() == user_name.trim() {
        return Err(EngineError::Validation(
            "character name must differ from the user's name".into(),
        ));
    }
    Ok(())
}

/// Checks every length bound and returns the column values to store.
pub fn to_fields(persona: &PersonaSettings) -> EngineResult<CharacterFields> {
    required("name", &persona.name, NAME_MAX)?;
    required("gender", &persona.gender, GENDER_MAX)?;
    bounded("identity", persona.identity.as_deref(), IDENTITY_MAX)?;
    bounded("nickname", persona.nickname.as_deref(), NICKNAME_MAX)?;
    bounded("detail_setting", persona.detail_setting.as_deref(), DETAIL_MAX)?;

    let other_setting = serde_json::to_string(&persona.other_setting)
        .map_err(|e| EngineError::Validation(format!("other_setting: {}", e)))?;
    bounded("other_setting", Some(&other_setting), OTHER_SETTING_MAX)?;

    Ok(CharacterFields {
        name: persona.name.trim().to_string(),
        gender: persona.gender.trim().to_string(),
        identity: persona.identity.clone(),
        nickname: persona.nickname.clone(),
        detail_setting: persona.detail_setting.clone(),
        other_setting,
        knowledge_base_id: persona.knowledge_base_id.clone(),
    })
}

/// Overlays the present fields of `patch` on `base`.
pub fn apply_patch(mut base: PersonaSettings, patch: UpdateCharacterRequest) -> PersonaSettings {
    if let Some(name) = patch.name {
        base.name = name;
    }
    if let Some(gender) = patch.gender {
        base.gender = gender;
    }
    if patch.identity.is_some() {
        base.identity = patch.identity;
    }
    if patch.nickname.is_some() {
        base.nickname = patch.nickname;
    }
    if patch.detail_setting.is_some() {
        base.detail_setting = patch.detail_setting;
    }
    if let Some(other) = patch.other_setting {
        base.other_setting = other;
    }
    if patch.knowledge_base_id.is_some() {
        base.knowledge_base_id = patch.knowledge_base_id;
    }
    base
}
