use std::sync::Arc;
use std::time::Duration;

use amity_db::Database;
use amity_db::queries::NewMessage;
use amity_types::api::{CharacterSummary, CreateCharacterRequest, UpdateCharacterRequest};
use amity_types::events::TurnResult;
use amity_types::models::{AffinityLevel, Character, ChatMessage, Favorability, User};
use anyhow::anyhow;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use tracing::{debug, error, info, warn};

use crate::analytics::{self, AnalyticsReport};
use crate::clock::{self, Clock, SystemClock};
use crate::completion::{
    CompletionError, CompletionRequest, CompletionService, PersonaDescriptor, RoleBinding,
};
use crate::error::{EngineError, EngineResult};
use crate::events::{self, Observation};
use crate::export::{self, ExportFile, ExportFormat};
use crate::transform::{PassThrough, TextTransform};
use crate::{affinity, history, persona, records};

/// Returned when an external identity already owns a character.
pub const ALREADY_LINKED: &str =
    "你已經有專屬伴侶了！每位用戶只能擁有一個AI角色。如果想要重新開始，請聯繫客服。";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Messages forwarded upstream per turn.
    pub history_window: usize,
    pub max_new_tokens: u32,
    pub upstream_timeout: Duration,
    /// Local offset for calendar-day and time-of-day computations.
    pub utc_offset: FixedOffset,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_window: 100,
            max_new_tokens: 1024,
            upstream_timeout: Duration::from_secs(30),
            utc_offset: Utc.fix(),
        }
    }
}

/// A freshly created character with its owner and optional opening line.
#[derive(Debug, Clone)]
pub struct CreatedCharacter {
    pub user: User,
    pub character: Character,
    pub greeting: Option<ChatMessage>,
    pub level: AffinityLevel,
}

#[derive(Debug, Clone)]
pub struct CharacterProfile {
    pub character: Character,
    pub favorability: Favorability,
    pub stored_messages: u64,
    pub first_message_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Conversation bound to an external messaging identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkedConversation {
    pub user_id: i64,
    pub character_id: i64,
}

/// Drives conversation turns and character management over the session
/// store. Collaborators are injected so tests can swap in fakes.
pub struct ChatEngine {
    db: Arc<Database>,
    completion: Arc<dyn CompletionService>,
    transform: Arc<dyn TextTransform>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl ChatEngine {
    pub fn new(db: Arc<Database>, completion: Arc<dyn CompletionService>, config: EngineConfig) -> Self {
        Self {
            db,
            completion,
            transform: Arc::new(PassThrough),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_transform(mut self, transform: Arc<dyn TextTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Runs store work off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> EngineResult<T>
    where
        F: FnOnce(&Database) -> EngineResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                EngineError::Store(anyhow!("blocking task failed: {}", e))
            })?
    }

    // -- Turns --

    /// One conversation turn. The user's line is persisted before the
    /// completion call; the reply, the counter advance and event detection
    /// only happen once a reply has arrived.
    pub async fn send_message(
        &self,
        user_id: i64,
        character_id: i64,
        text: &str,
    ) -> EngineResult<TurnResult> {
        if text.trim().is_empty() {
            return Err(EngineError::Validation("message must not be empty".into()));
        }

        let received_at = self.clock.now();
        let window_size = self.config.history_window;
        let inbound = text.to_string();

        let (character, user, level, window) = self
            .blocking(move |db| {
                let character = db
                    .get_character(character_id)?
                    .filter(|c| c.user_id == user_id)
                    .ok_or_else(|| EngineError::character_not_found(character_id))?;
                let user = db
                    .get_user(user_id)?
                    .ok_or_else(|| EngineError::user_not_found(user_id))?;

                let level = match db.get_favorability(character_id)? {
                    Some(row) => records::stored_level(&row),
                    None => {
                        warn!("Character {} has no favorability tracker", character_id);
                        AffinityLevel::Level1
                    }
                };

                db.touch_user(user_id, received_at)?;
                db.insert_message(&NewMessage {
                    character_id,
                    user_id,
                    speaker_name: &user.username,
                    from_user: true,
                    content: &inbound,
                    affinity_level: level.as_u8(),
                    at: received_at,
                })?;

                let window = history::window(db, character_id, window_size)?;
                Ok((records::character(character), user, level, window))
            })
            .await?;

        let request = CompletionRequest {
            personas: vec![
                PersonaDescriptor::user_stub(&user.username),
                PersonaDescriptor::character(&character.persona, &user.username, level),
            ],
            role: RoleBinding {
                user_name: user.username.clone(),
                primary_bot_name: character.persona.name.clone(),
            },
            messages: history::dialogue(&window, &user.username, &character.persona.name),
            max_new_tokens: self.config.max_new_tokens,
            knowledge_ids: character.persona.knowledge_base_id.iter().cloned().collect(),
        };
        debug!(
            "Character {}: requesting completion over {} messages",
            character_id,
            request.messages.len()
        );

        let outcome = tokio::time::timeout(
            self.config.upstream_timeout,
            self.completion.complete(request),
        )
        .await
        .unwrap_or(Err(CompletionError::Timeout));
        let completion = match outcome {
            Ok(reply) => reply,
            Err(e) => {
                error!("Character {}: completion failed: {}", character_id, e);
                return Err(EngineError::Upstream(e.to_string()));
            }
        };

        let reply = self.transform.apply(&completion.reply).await;
        let replied_at = self.clock.now();
        let speaker = character.persona.name.clone();
        let stored_reply = reply.clone();

        let (advance, first_message_at) = self
            .blocking(move |db| {
                db.insert_message(&NewMessage {
                    character_id,
                    user_id,
                    speaker_name: &speaker,
                    from_user: false,
                    content: &stored_reply,
                    affinity_level: level.as_u8(),
                    at: replied_at,
                })?;
                let advance = db
                    .update_favorability(character_id, replied_at, affinity::advance)?
                    .ok_or_else(|| EngineError::character_not_found(character_id))?;
                let first = db.first_message_at(character_id)?;
                Ok((advance, first))
            })
            .await?;

        let mut special_events = events::detect(&Observation {
            advance,
            first_message_at,
            now: replied_at,
            offset: self.config.utc_offset,
        });
        for event in &mut special_events {
            event.message = self.transform.apply(&event.message).await;
        }

        info!(
            "Character {}: turn complete (count {}, level {}, {} events)",
            character_id,
            advance.message_count,
            advance.level,
            special_events.len()
        );
        if advance.increased() {
            info!(
                "Character {}: level {} -> {}",
                character_id, advance.previous, advance.level
            );
        }

        Ok(TurnResult {
            reply,
            level: advance.level,
            level_increased: advance.increased(),
            message_count: advance.message_count,
            special_events,
            time_context: clock::time_context(replied_at, self.config.utc_offset),
            usage: completion.usage,
        })
    }

    // -- Characters --

    pub async fn create_character(&self, req: CreateCharacterRequest) -> EngineResult<CreatedCharacter> {
        persona::validate_user_name(&req.user_name)?;
        let fields = persona::to_fields(&req.character)?;
        persona::ensure_distinct_from_user(&fields.name, &req.user_name)?;
        let now = self.clock.now();
        let user_name = req.user_name.trim().to_string();
        let greeting = req.greeting.filter(|g| !g.trim().is_empty());
        let line_user_id = req.line_user_id.filter(|id| !id.is_empty());

        let created = self
            .blocking(move |db| {
                if let Some(external_id) = &line_user_id {
                    if db.get_transport_link(external_id)?.is_some_and(|l| l.character_id.is_some()) {
                        return Err(EngineError::Validation(ALREADY_LINKED.into()));
                    }
                }

                let user = db.get_or_create_user(&user_name, now)?;
                let row = db.create_character(user.id, &fields, now)?;

                // A concurrent create may have claimed the identity in between.
                if let Some(external_id) = &line_user_id {
                    if !db.link_transport(external_id, user.id, Some(row.id), now)? {
                        db.delete_character(row.id)?;
                        return Err(EngineError::Validation(ALREADY_LINKED.into()));
                    }
                }

                let greeting = match greeting {
                    Some(text) => {
                        let stored = db.insert_message(&NewMessage {
                            character_id: row.id,
                            user_id: user.id,
                            speaker_name: &row.name,
                            from_user: false,
                            content: &text,
                            affinity_level: AffinityLevel::Level1.as_u8(),
                            at: now,
                        })?;
                        Some(records::message(stored))
                    }
                    None => None,
                };

                Ok(CreatedCharacter {
                    user: records::user(user),
                    character: records::character(row),
                    greeting,
                    level: AffinityLevel::Level1,
                })
            })
            .await?;

        info!(
            "Created character {} ({}) for user {}",
            created.character.id, created.character.persona.name, created.user.id
        );
        Ok(created)
    }

    pub async fn get_character(&self, character_id: i64) -> EngineResult<Character> {
        self.blocking(move |db| {
            db.get_character(character_id)?
                .map(records::character)
                .ok_or_else(|| EngineError::character_not_found(character_id))
        })
        .await
    }

    pub async fn update_character(
        &self,
        character_id: i64,
        patch: UpdateCharacterRequest,
    ) -> EngineResult<Character> {
        let updated = self
            .blocking(move |db| {
                let current = db
                    .get_character(character_id)?
                    .map(records::character)
                    .ok_or_else(|| EngineError::character_not_found(character_id))?;

                let persona = persona::apply_patch(current.persona, patch);
                let fields = persona::to_fields(&persona)?;
                if let Some(owner) = db.get_user(current.user_id)? {
                    persona::ensure_distinct_from_user(&fields.name, &owner.username)?;
                }
                if !db.update_character(character_id, &fields)? {
                    return Err(EngineError::character_not_found(character_id));
                }

                Ok(Character {
                    persona,
                    ..current
                })
            })
            .await?;

        info!("Updated character {}", character_id);
        Ok(updated)
    }

    pub async fn delete_character(&self, character_id: i64) -> EngineResult<()> {
        let deleted = self
            .blocking(move |db| Ok(db.delete_character(character_id)?))
            .await?;
        if !deleted {
            return Err(EngineError::character_not_found(character_id));
        }
        info!("Deleted character {} and its conversation", character_id);
        Ok(())
    }

    /// Newest first, each with its current level.
    pub async fn list_characters(&self, user_id: i64) -> EngineResult<Vec<CharacterSummary>> {
        self.blocking(move |db| {
            if db.get_user(user_id)?.is_none() {
                return Err(EngineError::user_not_found(user_id));
            }

            let mut summaries = Vec::new();
            for row in db.list_characters(user_id)? {
                let level = db
                    .get_favorability(row.id)?
                    .map(|f| records::stored_level(&f))
                    .unwrap_or_default();
                summaries.push(CharacterSummary {
                    character_id: row.id,
                    name: row.name,
                    nickname: row.nickname,
                    created_at: row.created_at,
                    favorability: level,
                });
            }
            Ok(summaries)
        })
        .await
    }

    // -- Conversation state --

    /// Most recent `limit` messages (all when `None`), oldest first.
    pub async fn history(&self, character_id: i64, limit: Option<usize>) -> EngineResult<Vec<ChatMessage>> {
        self.blocking(move |db| {
            if db.get_character(character_id)?.is_none() {
                return Err(EngineError::character_not_found(character_id));
            }
            let rows = db.get_messages(character_id, limit)?;
            Ok(rows.into_iter().map(records::message).collect())
        })
        .await
    }

    pub async fn favorability(&self, character_id: i64) -> EngineResult<Favorability> {
        self.blocking(move |db| {
            db.get_favorability(character_id)?
                .map(records::favorability)
                .ok_or_else(|| EngineError::character_not_found(character_id))
        })
        .await
    }

    /// Character, affinity and a summary of the stored conversation.
    pub async fn profile(&self, character_id: i64) -> EngineResult<CharacterProfile> {
        self.blocking(move |db| {
            let character = db
                .get_character(character_id)?
                .map(records::character)
                .ok_or_else(|| EngineError::character_not_found(character_id))?;
            let favorability = db
                .get_favorability(character_id)?
                .map(records::favorability)
                .ok_or_else(|| {
                    EngineError::Store(anyhow!("character {} has no tracker", character_id))
                })?;

            Ok(CharacterProfile {
                character,
                favorability,
                stored_messages: db.count_messages(character_id)?,
                first_message_at: db.first_message_at(character_id)?,
                last_message_at: db.last_message_at(character_id)?,
            })
        })
        .await
    }

    async fn transcript(&self, character_id: i64) -> EngineResult<(Character, Favorability, Vec<ChatMessage>)> {
        self.blocking(move |db| {
            let character = db
                .get_character(character_id)?
                .map(records::character)
                .ok_or_else(|| EngineError::character_not_found(character_id))?;
            let favorability = db
                .get_favorability(character_id)?
                .map(records::favorability)
                .ok_or_else(|| {
                    EngineError::Store(anyhow!("character {} has no tracker", character_id))
                })?;
            let messages = db
                .get_messages(character_id, None)?
                .into_iter()
                .map(records::message)
                .collect();
            Ok((character, favorability, messages))
        })
        .await
    }

    pub async fn export(&self, character_id: i64, format: ExportFormat) -> EngineResult<ExportFile> {
        let (character, favorability, messages) = self.transcript(character_id).await?;
        export::render(
            &character,
            &favorability,
            &messages,
            format,
            self.clock.now(),
            self.config.utc_offset,
        )
    }

    pub async fn analytics(&self, character_id: i64) -> EngineResult<AnalyticsReport> {
        let (character, favorability, messages) = self.transcript(character_id).await?;
        let analytics = analytics::compute(
            &favorability,
            &messages,
            self.clock.now(),
            self.config.utc_offset,
        );

        Ok(AnalyticsReport {
            success: true,
            character_id,
            character_name: character.persona.name,
            total_messages: messages.len(),
            analytics,
        })
    }

    // -- Transport links --

    /// The conversation an external identity is bound to, if any.
    pub async fn resolve_link(&self, external_id: &str) -> EngineResult<Option<LinkedConversation>> {
        let external_id = external_id.to_string();
        self.blocking(move |db| {
            let link = db.get_transport_link(&external_id)?;
            Ok(link.and_then(|l| {
                l.character_id.map(|character_id| LinkedConversation {
                    user_id: l.user_id,
                    character_id,
                })
            }))
        })
        .await
    }

    /// True once the identity has ever been bound, even if its character
    /// has since been deleted.
    pub async fn is_linked(&self, external_id: &str) -> EngineResult<bool> {
        let external_id = external_id.to_string();
        self.blocking(move |db| Ok(db.get_transport_link(&external_id)?.is_some()))
            .await
    }
}
