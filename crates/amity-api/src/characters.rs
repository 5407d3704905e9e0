use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};

use amity_engine::affinity::{LEVEL_1_THRESHOLD, LEVEL_2_THRESHOLD, LEVEL_3_THRESHOLD};
use amity_types::api::{
    CharacterProfileResponse, CharacterResponse, CreateCharacterRequest, CreateCharacterResponse,
    DeleteResponse, FavorabilityResponse, LevelThresholds, UpdateCharacterRequest,
    UserCharactersResponse,
};

use crate::error::ApiError;
use crate::line_text::clean_for_line;
use crate::state::AppState;

pub fn character_ready_message(character_name: &str, greeting: &str) -> String {
    format!(
        "✅ 角色設定完成！\n\n你的專屬伴侶 {} 已經準備好了~ 💕\n\n{}",
        character_name,
        clean_for_line(greeting)
    )
}

pub async fn create_character(
    State(state): State<AppState>,
    payload: Result<Json<CreateCharacterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let line_user_id = req.line_user_id.clone().filter(|id| !id.is_empty());
    let created = state.engine.create_character(req).await?;

    // The opening line also goes out on the linked chat, when there is one.
    if let (Some(line), Some(external_id), Some(greeting)) =
        (&state.line, line_user_id.as_deref(), created.greeting.as_ref())
    {
        let text = character_ready_message(&created.character.persona.name, &greeting.content);
        if line.transport.push(external_id, &text).await {
            info!("Sent opening line of character {} to {}", created.character.id, external_id);
        } else {
            warn!("Could not send opening line to {}", external_id);
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(CreateCharacterResponse {
            success: true,
            user_id: created.user.id,
            character_id: created.character.id,
            character: created.character,
            initial_message: created.greeting.map(|m| m.content),
            favorability_level: created.level,
        }),
    ))
}

pub async fn list_characters(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<UserCharactersResponse>, ApiError> {
    let characters = state.engine.list_characters(user_id).await?;
    Ok(Json(UserCharactersResponse {
        success: true,
        user_id,
        character_count: characters.len(),
        characters,
    }))
}

pub async fn favorability(
    State(state): State<AppState>,
    Path(character_id): Path<i64>,
) -> Result<Json<FavorabilityResponse>, ApiError> {
    let fav = state.engine.favorability(character_id).await?;
    Ok(Json(FavorabilityResponse {
        success: true,
        character_id,
        current_level: fav.current_level,
        message_count: fav.message_count,
        last_updated: fav.last_updated,
        progress: LevelThresholds {
            level_1_threshold: LEVEL_1_THRESHOLD,
            level_2_threshold: LEVEL_2_THRESHOLD,
            level_3_threshold: LEVEL_3_THRESHOLD,
        },
    }))
}

pub async fn profile(
    State(state): State<AppState>,
    Path(character_id): Path<i64>,
) -> Result<Json<CharacterProfileResponse>, ApiError> {
    let profile = state.engine.profile(character_id).await?;
    let level = profile.favorability.current_level;
    Ok(Json(CharacterProfileResponse {
        success: true,
        character: profile.character,
        favorability_level: level,
        level_name: level.name(),
        message_count: profile.favorability.message_count,
        stored_messages: profile.stored_messages,
        first_message_at: profile.first_message_at,
        last_message_at: profile.last_message_at,
    }))
}

pub async fn update_character(
    State(state): State<AppState>,
    Path(character_id): Path<i64>,
    payload: Result<Json<UpdateCharacterRequest>, JsonRejection>,
) -> Result<Json<CharacterResponse>, ApiError> {
    let Json(patch) = payload?;
    let character = state.engine.update_character(character_id, patch).await?;
    Ok(Json(CharacterResponse {
        success: true,
        character,
    }))
}

pub async fn delete_character(
    State(state): State<AppState>,
    Path(character_id): Path<i64>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.engine.delete_character(character_id).await?;
    Ok(Json(DeleteResponse {
        success: true,
        character_id,
    }))
}
