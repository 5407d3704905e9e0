//! Chat-platform webhook. Each inbound text message from a linked identity
//! runs one turn; the reply goes back on the event's reply token and any
//! celebratory messages follow as pushes. Generated text is cleaned before
//! it is sent.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::{debug, error, info, warn};

use amity_engine::{ChatEngine, EngineError};

use crate::line_text::clean_for_line;
use crate::state::{AppState, LineChannel};

pub const SIGNATURE_HEADER: &str = "x-line-signature";

pub const SETUP_HINT: &str = "你還沒有設定AI伴侶喔~ 💔\n\n請先到網站建立你的專屬角色，完成後就可以在這裡和他聊天了！";
pub const UPSTREAM_APOLOGY: &str = "抱歉，處理訊息時發生錯誤，請稍後再試 😢\n\n如果問題持續，請聯繫客服。";
pub const SYSTEM_APOLOGY: &str = "系統發生錯誤，請稍後再試 🙏\n\n我們正在努力修復中！";

/// Used in welcomes when the follower's profile is unavailable.
pub const FALLBACK_DISPLAY_NAME: &str = "朋友";

pub fn welcome_message(line: &LineChannel, display_name: &str, external_id: &str) -> String {
    format!(
        "嗨 {}！歡迎來到{} 💕\n\n✨ 最有趣的戀愛聊天機器人，現在就開始體驗！\n\n要開始使用，請先設定你的專屬AI伴侶：\n👉 {}?lineUserId={}\n\n完成設定後，回到這裡就可以聊出激情囉！🔥",
        display_name, line.bot_name, line.setup_url, external_id
    )
}

pub fn welcome_back_message(display_name: &str) -> String {
    format!(
        "歡迎回來 {}！😊\n\n我們的專屬對話依然在這裡等你~ 繼續聊天吧！💕",
        display_name
    )
}

#[derive(Debug, Deserialize)]
pub struct WebhookBody {
    #[serde(default)]
    pub events: Vec<LineEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LineEvent {
    #[serde(rename_all = "camelCase")]
    Message {
        reply_token: String,
        source: EventSource,
        message: LineMessage,
    },
    Follow {
        source: EventSource,
    },
    Unfollow {
        source: EventSource,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LineMessage {
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Checks `signature` against base64(HMAC-SHA256(secret, body)) in constant time.
pub fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(channel_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

pub async fn line_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(line) = state.line.clone() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !verify_signature(&line.channel_secret, &body, signature) {
        warn!("Rejected webhook call with bad signature");
        return (StatusCode::BAD_REQUEST, Json(json!({ "status": "invalid signature" })))
            .into_response();
    }

    let parsed: WebhookBody = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Malformed webhook body: {}", e);
            return (StatusCode::BAD_REQUEST, Json(json!({ "status": "malformed body" })))
                .into_response();
        }
    };

    // The platform expects a prompt acknowledgement; turns run detached.
    for event in parsed.events {
        let engine = state.engine.clone();
        let line = line.clone();
        tokio::spawn(async move {
            process_event(&engine, &line, event).await;
        });
    }

    Json(json!({ "status": "ok" })).into_response()
}

pub async fn process_event(engine: &ChatEngine, line: &LineChannel, event: LineEvent) {
    let transport = line.transport.as_ref();
    match event {
        LineEvent::Message {
            reply_token,
            source,
            message: LineMessage::Text { text },
        } => {
            let Some(external_id) = source.user_id else {
                transport.reply(&reply_token, SETUP_HINT).await;
                return;
            };
            handle_text(engine, line, &reply_token, &external_id, &text).await;
        }
        LineEvent::Message { .. } => debug!("Ignoring non-text message event"),
        LineEvent::Follow { source } => match source.user_id {
            Some(external_id) => handle_follow(engine, line, &external_id).await,
            None => debug!("Ignoring follow without a user id"),
        },
        LineEvent::Unfollow { source } => {
            info!("Unfollowed by {}", source.user_id.as_deref().unwrap_or("unknown"));
        }
        LineEvent::Other => debug!("Ignoring unsupported webhook event"),
    }
}

/// Someone who was ever linked is welcomed back; anyone else gets the
/// setup link.
async fn handle_follow(engine: &ChatEngine, line: &LineChannel, external_id: &str) {
    let transport = line.transport.as_ref();
    let display_name = transport
        .display_name(external_id)
        .await
        .unwrap_or_else(|| FALLBACK_DISPLAY_NAME.to_string());

    let message = match engine.is_linked(external_id).await {
        Ok(true) => {
            info!("{} followed again", external_id);
            welcome_back_message(&display_name)
        }
        Ok(false) => {
            info!("New follower {}", external_id);
            welcome_message(line, &display_name, external_id)
        }
        Err(e) => {
            error!("Link lookup failed for follower {}: {}", external_id, e);
            welcome_message(line, FALLBACK_DISPLAY_NAME, external_id)
        }
    };
    transport.push(external_id, &message).await;
}

async fn handle_text(
    engine: &ChatEngine,
    line: &LineChannel,
    reply_token: &str,
    external_id: &str,
    text: &str,
) {
    let transport = line.transport.as_ref();
    let link = match engine.resolve_link(external_id).await {
        Ok(Some(link)) => link,
        Ok(None) => {
            transport.reply(reply_token, SETUP_HINT).await;
            return;
        }
        Err(e) => {
            error!("Link lookup failed for {}: {}", external_id, e);
            transport.reply(reply_token, SYSTEM_APOLOGY).await;
            return;
        }
    };

    match engine.send_message(link.user_id, link.character_id, text).await {
        Ok(turn) => {
            transport.reply(reply_token, &clean_for_line(&turn.reply)).await;
            for event in &turn.special_events {
                transport.push(external_id, &clean_for_line(&event.message)).await;
            }
        }
        Err(EngineError::Upstream(e)) => {
            warn!("Turn for {} failed upstream: {}", external_id, e);
            transport.reply(reply_token, UPSTREAM_APOLOGY).await;
        }
        Err(e) => {
            error!("Turn for {} failed: {}", external_id, e);
            transport.reply(reply_token, SYSTEM_APOLOGY).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        STANDARD.encode(mac.finalize().into_bytes())
    }

    #[test]
    fn signature_round_trip() {
        let body = br#"{"events":[]}"#;
        let sig = sign("s3cret", body);
        assert!(verify_signature("s3cret", body, &sig));
        assert!(!verify_signature("other", body, &sig));
        assert!(!verify_signature("s3cret", b"{}", &sig));
        assert!(!verify_signature("s3cret", body, "not base64!"));
    }

    #[test]
    fn parses_platform_events() {
        let raw = r#"{
            "destination": "Ubot",
            "events": [
                {"type": "message", "replyToken": "r1", "timestamp": 1,
                 "source": {"type": "user", "userId": "U1"},
                 "message": {"type": "text", "id": "m1", "text": "嗨"}},
                {"type": "message", "replyToken": "r2",
                 "source": {"type": "user", "userId": "U1"},
                 "message": {"type": "sticker", "id": "m2", "packageId": "1"}},
                {"type": "follow", "replyToken": "r3", "source": {"type": "user", "userId": "U2"}},
                {"type": "postback", "replyToken": "r4"}
            ]
        }"#;
        let body: WebhookBody = serde_json::from_str(raw).unwrap();
        assert_eq!(body.events.len(), 4);

        match &body.events[0] {
            LineEvent::Message {
                reply_token,
                source,
                message: LineMessage::Text { text },
            } => {
                assert_eq!(reply_token, "r1");
                assert_eq!(source.user_id.as_deref(), Some("U1"));
                assert_eq!(text, "嗨");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            body.events[1],
            LineEvent::Message { message: LineMessage::Other, .. }
        ));
        assert!(matches!(body.events[2], LineEvent::Follow { .. }));
        assert!(matches!(body.events[3], LineEvent::Other));
    }
}
