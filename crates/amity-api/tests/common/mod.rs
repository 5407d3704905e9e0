#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use amity_api::{AppState, LineChannel, router};
use amity_db::Database;
use amity_engine::completion::{
    CompletionError, CompletionReply, CompletionRequest, CompletionService,
};
use amity_engine::transport::MessagingTransport;
use amity_engine::{ChatEngine, EngineConfig};
use amity_types::events::TokenUsage;
use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;

pub const CHANNEL_SECRET: &str = "channel-secret";
pub const BOT_NAME: &str = "測試機器人";
pub const SETUP_URL: &str = "https://amity.test/setup";

/// Echoes the last dialogue turn back, or fails every call when `failing`.
#[derive(Default)]
pub struct EchoCompletion {
    pub failing: bool,
}

#[async_trait]
impl CompletionService for EchoCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionReply, CompletionError> {
        if self.failing {
            return Err(CompletionError::Status {
                status: 503,
                body: "overloaded".into(),
            });
        }
        let last = request.messages.last().map(|t| t.content.clone()).unwrap_or_default();
        Ok(CompletionReply {
            reply: format!("你說了：{}", last),
            usage: TokenUsage {
                total_tokens: 7,
                ..Default::default()
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Reply { token: String, text: String },
    Push { to: String, text: String },
}

/// Records every outbound message. Profiles resolve only for ids listed in
/// `names`.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<Sent>>,
    pub names: Mutex<Vec<(String, String)>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Drains what has been sent so far.
    pub fn take(&self) -> Vec<Sent> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn set_name(&self, user_id: &str, name: &str) {
        self.names.lock().unwrap().push((user_id.into(), name.into()));
    }
}

#[async_trait]
impl MessagingTransport for RecordingTransport {
    async fn reply(&self, reply_token: &str, text: &str) -> bool {
        self.sent.lock().unwrap().push(Sent::Reply {
            token: reply_token.into(),
            text: text.into(),
        });
        true
    }

    async fn push(&self, to: &str, text: &str) -> bool {
        self.sent.lock().unwrap().push(Sent::Push {
            to: to.into(),
            text: text.into(),
        });
        true
    }

    async fn display_name(&self, user_id: &str) -> Option<String> {
        self.names
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == user_id)
            .map(|(_, name)| name.clone())
    }
}

pub struct TestApp {
    pub db: Arc<Database>,
    pub engine: Arc<ChatEngine>,
    pub transport: Arc<RecordingTransport>,
    pub line: LineChannel,
    pub router: Router,
}

pub fn app() -> TestApp {
    app_with(EchoCompletion::default(), true)
}

pub fn app_with(completion: EchoCompletion, with_line: bool) -> TestApp {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let engine = Arc::new(ChatEngine::new(
        db.clone(),
        Arc::new(completion),
        EngineConfig::default(),
    ));
    let transport = Arc::new(RecordingTransport::default());
    let line = LineChannel::new(CHANNEL_SECRET, transport.clone()).with_welcome(BOT_NAME, SETUP_URL);

    let mut state = AppState::new(engine.clone());
    if with_line {
        state = state.with_line(line.clone());
    }

    TestApp {
        db,
        engine,
        transport,
        line,
        router: router(state),
    }
}

impl TestApp {
    pub async fn call(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, body) = self.call(request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    pub async fn send_json(&self, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, body) = self.call(request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    /// Creates a character for `user_name` and returns `(user_id, character_id)`.
    pub async fn create(&self, user_name: &str, character_name: &str, line_user_id: Option<&str>) -> (i64, i64) {
        let (status, body) = self
            .send_json(
                "POST",
                "/api/v2/create-character",
                serde_json::json!({
                    "user_name": user_name,
                    "character": { "name": character_name, "gender": "女", "identity": "學生" },
                    "greeting": "你好呀",
                    "line_user_id": line_user_id,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        (
            body["user_id"].as_i64().unwrap(),
            body["character_id"].as_i64().unwrap(),
        )
    }
}
