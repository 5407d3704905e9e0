//! Completion-service collaborator: the request the engine builds each turn,
//! the trait it calls through, and the live HTTP client.

use std::sync::Mutex;
use std::time::Duration;

use amity_types::events::TokenUsage;
use amity_types::models::{AffinityLevel, PersonaSettings};
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Refresh the signed token this many seconds before it expires.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feeling {
    pub name: String,
    pub level: AffinityLevel,
}

/// One party in the conversation as described to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonaDescriptor {
    pub name: String,
    pub gender: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_setting: Option<String>,
    /// Serialized JSON of the structured settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_setting: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub feeling_toward: Vec<Feeling>,
}

impl PersonaDescriptor {
    pub fn user_stub(user_name: &str) -> Self {
        Self {
            name: user_name.to_string(),
            gender: "男".to_string(),
            identity: None,
            nickname: None,
            detail_setting: Some("用戶".to_string()),
            other_setting: None,
            feeling_toward: Vec::new(),
        }
    }

    /// The character, annotated with how it currently feels about the user.
    pub fn character(persona: &PersonaSettings, user_name: &str, level: AffinityLevel) -> Self {
        let other_setting = serde_json::to_string(&persona.other_setting)
            .ok()
            .filter(|s| s != "{}");

        Self {
            name: persona.name.clone(),
            gender: persona.gender.clone(),
            identity: persona.identity.clone(),
            nickname: persona.nickname.clone(),
            detail_setting: persona.detail_setting.clone(),
            other_setting,
            feeling_toward: vec![Feeling {
                name: user_name.to_string(),
                level,
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleBinding {
    pub user_name: String,
    pub primary_bot_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialogueTurn {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub personas: Vec<PersonaDescriptor>,
    pub role: RoleBinding,
    pub messages: Vec<DialogueTurn>,
    pub max_new_tokens: u32,
    pub knowledge_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReply {
    pub reply: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request timed out")]
    Timeout,

    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion transport error: {0}")]
    Transport(String),

    #[error("malformed completion response: {0}")]
    Malformed(String),

    #[error("could not sign completion token: {0}")]
    Auth(String),
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionReply, CompletionError>;
}

// -- HTTP client --

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub base_url: String,
    pub endpoint: String,
    pub model: String,
    pub access_key_id: String,
    pub secret_key: String,
    pub token_expiry: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    exp: i64,
    nbf: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: i64,
}

#[derive(Serialize)]
struct ChatPayload<'a> {
    model: &'a str,
    character_settings: &'a [PersonaDescriptor],
    role_setting: &'a RoleBinding,
    messages: &'a [DialogueTurn],
    max_new_tokens: u32,
    n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    know_ids: Option<&'a [String]>,
}

#[derive(Deserialize)]
struct ChatEnvelope {
    data: Option<ChatData>,
}

#[derive(Deserialize)]
struct ChatData {
    reply: Option<String>,
    #[serde(default)]
    usage: TokenUsage,
}

/// Chat-completion client authenticating with a short-lived HS256 token
/// signed from the access key pair.
pub struct HttpCompletionClient {
    http: Client,
    config: CompletionConfig,
    token: Mutex<Option<CachedToken>>,
}

impl HttpCompletionClient {
    pub fn new(config: CompletionConfig) -> Result<Self, CompletionError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            config,
            token: Mutex::new(None),
        })
    }

    fn url(&self) -> String {
        format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.endpoint
        )
    }

    /// Returns the cached token, minting a new one when it is missing or
    /// about to expire.
    fn bearer_token(&self) -> Result<String, CompletionError> {
        let now = Utc::now().timestamp();
        let mut cached = self
            .token
            .lock()
            .map_err(|e| CompletionError::Auth(format!("token cache poisoned: {}", e)))?;

        if let Some(token) = cached.as_ref() {
            if now < token.expires_at - TOKEN_REFRESH_MARGIN_SECS {
                return Ok(token.token.clone());
            }
        }

        let expires_at = now + self.config.token_expiry.as_secs() as i64;
        let claims = Claims {
            iss: &self.config.access_key_id,
            exp: expires_at,
            nbf: now - 5,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.secret_key.as_bytes()),
        )
        .map_err(|e| CompletionError::Auth(e.to_string()))?;

        debug!("Minted completion token valid until {}", expires_at);
        *cached = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });
        Ok(token)
    }
}

#[async_trait]
impl CompletionService for HttpCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionReply, CompletionError> {
        let token = self.bearer_token()?;
        let payload = ChatPayload {
            model: &self.config.model,
            character_settings: &request.personas,
            role_setting: &request.role,
            messages: &request.messages,
            max_new_tokens: request.max_new_tokens,
            n: 1,
            know_ids: (!request.knowledge_ids.is_empty()).then_some(request.knowledge_ids.as_slice()),
        };

        let response = self
            .http
            .post(self.url())
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout
                } else {
                    CompletionError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Completion service returned {}: {}", status, body);
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: ChatEnvelope = response
            .json()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;
        let data = envelope
            .data
            .ok_or_else(|| CompletionError::Malformed("missing data".into()))?;
        let reply = data
            .reply
            .ok_or_else(|| CompletionError::Malformed("missing data.reply".into()))?;

        Ok(CompletionReply {
            reply,
            usage: data.usage,
        })
    }
}
