use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::FixedOffset;

use amity_api::state::{DEFAULT_BOT_NAME, DEFAULT_SETUP_URL};
use amity_engine::EngineConfig;
use amity_engine::completion::CompletionConfig;

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub engine: EngineConfig,
    pub completion: CompletionConfig,
    pub text_transform_url: Option<String>,
    pub line: Option<LineConfig>,
}

#[derive(Debug, Clone)]
pub struct LineConfig {
    pub channel_secret: String,
    pub access_token: String,
    pub bot_name: String,
    pub setup_url: String,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn var_or(name: &str, default: &str) -> String {
    var(name).unwrap_or_else(|| default.to_string())
}

fn parsed<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{} has an invalid value {:?}: {}", name, raw, e)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let offset_hours: i32 = parsed("AMITY_UTC_OFFSET_HOURS", 0)?;
        let utc_offset = FixedOffset::east_opt(offset_hours * 3600)
            .with_context(|| format!("AMITY_UTC_OFFSET_HOURS out of range: {}", offset_hours))?;
        let upstream_timeout = Duration::from_secs(parsed("COMPLETION_TIMEOUT_SECS", 30)?);

        let engine = EngineConfig {
            history_window: parsed("AMITY_HISTORY_WINDOW", 100)?,
            max_new_tokens: parsed("AMITY_MAX_NEW_TOKENS", 1024)?,
            upstream_timeout,
            utc_offset,
        };

        let completion = CompletionConfig {
            base_url: var_or("COMPLETION_BASE_URL", "https://api.sensenova.cn/v1/llm"),
            endpoint: var_or("COMPLETION_ENDPOINT", "/character/chat-completions"),
            model: var_or("COMPLETION_MODEL", "SenseChat-Character-Pro"),
            access_key_id: var("COMPLETION_ACCESS_KEY_ID").unwrap_or_default(),
            secret_key: var("COMPLETION_SECRET_KEY").unwrap_or_default(),
            token_expiry: Duration::from_secs(parsed("TOKEN_EXPIRY_SECONDS", 1800)?),
            timeout: upstream_timeout,
        };

        let line = match (var("LINE_CHANNEL_SECRET"), var("LINE_CHANNEL_ACCESS_TOKEN")) {
            (Some(channel_secret), Some(access_token)) => Some(LineConfig {
                channel_secret,
                access_token,
                bot_name: var_or("LINE_BOT_NAME", DEFAULT_BOT_NAME),
                setup_url: var_or("AMITY_SETUP_URL", DEFAULT_SETUP_URL),
            }),
            _ => None,
        };

        Ok(Self {
            host: var_or("AMITY_HOST", "0.0.0.0"),
            port: parsed("AMITY_PORT", 8000)?,
            db_path: var_or("AMITY_DB_PATH", "amity.db").into(),
            engine,
            completion,
            text_transform_url: var("TEXT_TRANSFORM_URL"),
            line,
        })
    }

    pub fn has_completion_credentials(&self) -> bool {
        !self.completion.access_key_id.is_empty() && !self.completion.secret_key.is_empty()
    }
}
