#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use amity_db::Database;
use amity_engine::clock::FixedClock;
use amity_engine::completion::{
    CompletionError, CompletionReply, CompletionRequest, CompletionService,
};
use amity_engine::orchestrator::CreatedCharacter;
use amity_engine::{ChatEngine, EngineConfig};
use amity_types::api::CreateCharacterRequest;
use amity_types::events::TokenUsage;
use amity_types::models::PersonaSettings;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-06-01T10:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Completion service that plays back queued outcomes and records every
/// request. An empty queue answers "好呀".
#[derive(Default)]
pub struct ScriptedCompletion {
    queue: Mutex<VecDeque<Result<String, CompletionError>>>,
    seen: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl ScriptedCompletion {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn push_reply(&self, reply: &str) {
        self.queue.lock().unwrap().push_back(Ok(reply.to_string()));
    }

    pub fn push_failure(&self, err: CompletionError) {
        self.queue.lock().unwrap().push_back(Err(err));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionReply, CompletionError> {
        self.seen.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.queue.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok("好呀".to_string())).map(|reply| CompletionReply {
            reply,
            usage: TokenUsage {
                total_tokens: 10,
                ..Default::default()
            },
        })
    }
}

pub struct Harness {
    pub db: Arc<Database>,
    pub completion: Arc<ScriptedCompletion>,
    pub clock: Arc<FixedClock>,
    pub engine: Arc<ChatEngine>,
}

pub fn harness() -> Harness {
    harness_with(ScriptedCompletion::default(), EngineConfig::default())
}

pub fn harness_with(completion: ScriptedCompletion, config: EngineConfig) -> Harness {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let completion = Arc::new(completion);
    let clock = Arc::new(FixedClock::new(t0()));
    let engine = ChatEngine::new(db.clone(), completion.clone(), config).with_clock(clock.clone());
    Harness {
        db,
        completion,
        clock,
        engine: Arc::new(engine),
    }
}

pub fn persona(name: &str) -> PersonaSettings {
    PersonaSettings {
        name: name.into(),
        gender: "女".into(),
        identity: Some("咖啡店店員".into()),
        detail_setting: Some("溫柔體貼，喜歡聽人說話".into()),
        ..Default::default()
    }
}

pub async fn create(h: &Harness, user_name: &str, character_name: &str) -> CreatedCharacter {
    h.engine
        .create_character(CreateCharacterRequest {
            user_name: user_name.into(),
            character: persona(character_name),
            greeting: None,
            line_user_id: None,
        })
        .await
        .unwrap()
}

/// Moves a character's counter straight to `count`, level included.
pub fn seed_count(h: &Harness, character_id: i64, count: u64) {
    h.db
        .update_favorability(character_id, t0(), |row| {
            row.message_count = count;
            row.current_level = amity_engine::affinity::level_for(count).as_u8();
        })
        .unwrap()
        .unwrap();
}
