use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::header,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};

use amity_engine::analytics::AnalyticsReport;
use amity_engine::export::ExportFormat;
use amity_types::api::{HistoryResponse, SendMessageRequest, SendMessageResponse};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "amity" }))
}

pub async fn send_message(
    State(state): State<AppState>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let Json(req) = payload?;
    let turn = state
        .engine
        .send_message(req.user_id, req.character_id, &req.message)
        .await?;
    Ok(Json(SendMessageResponse {
        success: true,
        turn,
    }))
}

pub async fn history(
    State(state): State<AppState>,
    Path(character_id): Path<i64>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Query(query) = query?;
    let messages = state.engine.history(character_id, Some(query.limit)).await?;
    Ok(Json(HistoryResponse {
        success: true,
        character_id,
        message_count: messages.len(),
        messages,
    }))
}

pub async fn export(
    State(state): State<AppState>,
    Path(character_id): Path<i64>,
    query: Result<Query<ExportQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let format = match query.format.as_deref() {
        Some(raw) => raw.parse::<ExportFormat>()?,
        None => ExportFormat::default(),
    };
    let file = state.engine.export(character_id, format).await?;

    Ok((
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.filename),
            ),
        ],
        file.body,
    ))
}

pub async fn analytics(
    State(state): State<AppState>,
    Path(character_id): Path<i64>,
) -> Result<Json<AnalyticsReport>, ApiError> {
    Ok(Json(state.engine.analytics(character_id).await?))
}
