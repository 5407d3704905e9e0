pub mod characters;
pub mod conversation;
pub mod error;
pub mod line_text;
pub mod state;
pub mod webhook;

use axum::{
    Router,
    routing::{delete, get, post, put},
};

pub use error::ApiError;
pub use state::{AppState, LineChannel};

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/create-character", post(characters::create_character))
        .route("/send-message", post(conversation::send_message))
        .route("/conversation-history/{character_id}", get(conversation::history))
        .route("/user-characters/{user_id}", get(characters::list_characters))
        .route("/favorability/{character_id}", get(characters::favorability))
        .route("/character-profile/{character_id}", get(characters::profile))
        .route("/update-character/{character_id}", put(characters::update_character))
        .route("/delete-character/{character_id}", delete(characters::delete_character))
        .route("/export-conversation/{character_id}", get(conversation::export))
        .route("/analytics/{character_id}", get(conversation::analytics));

    Router::new()
        .route("/health", get(conversation::health))
        .route("/webhook/line", post(webhook::line_webhook))
        .nest("/api/v2", api)
        .with_state(state)
}
