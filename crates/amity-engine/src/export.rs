//! Conversation export as a downloadable JSON or plain-text document.

use std::fmt::{self, Write as _};
use std::str::FromStr;

use amity_types::models::{AffinityLevel, Character, ChatMessage, Favorability};
use anyhow::anyhow;
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

use crate::analytics::conversation_days;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    Json,
    #[default]
    Txt,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Txt => "txt",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Txt => "text/plain; charset=utf-8",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "txt" => Ok(Self::Txt),
            other => Err(EngineError::Validation(format!(
                "unsupported export format: {}",
                other
            ))),
        }
    }
}

/// A rendered export ready to be served as an attachment.
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub filename: String,
    pub content_type: &'static str,
    pub body: String,
}

#[derive(Serialize)]
struct ExportInfo {
    export_date: DateTime<Utc>,
    character_id: i64,
    total_messages: usize,
    conversation_days: i64,
}

#[derive(Serialize)]
struct CharacterSection<'a> {
    name: &'a str,
    nickname: Option<&'a str>,
    gender: &'a str,
    identity: Option<&'a str>,
    personality: Option<&'a str>,
    background_story: &'a str,
    interests: &'a [String],
}

#[derive(Serialize)]
struct FavorabilitySection {
    level: AffinityLevel,
    level_name: &'static str,
    message_count: u64,
}

#[derive(Serialize)]
struct ExportedMessage<'a> {
    timestamp: DateTime<Utc>,
    speaker: &'a str,
    content: &'a str,
    favorability_level: AffinityLevel,
}

#[derive(Serialize)]
struct ExportDocument<'a> {
    export_info: ExportInfo,
    character: CharacterSection<'a>,
    favorability: FavorabilitySection,
    messages: Vec<ExportedMessage<'a>>,
}

/// Renders the full transcript. `messages` must be in chronological order;
/// times in the text rendering are shown in `offset`.
pub fn render(
    character: &Character,
    favorability: &Favorability,
    messages: &[ChatMessage],
    format: ExportFormat,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<ExportFile, EngineError> {
    let days = conversation_days(messages, offset);
    let body = match format {
        ExportFormat::Json => render_json(character, favorability, messages, days, now)?,
        ExportFormat::Txt => render_txt(character, favorability, messages, days, now, offset)
            .map_err(|e| EngineError::Store(anyhow!("text export failed: {}", e)))?,
    };

    Ok(ExportFile {
        filename: format!(
            "conversation_{}_{}.{}",
            character.id,
            now.with_timezone(&offset).format("%Y%m%d_%H%M%S"),
            format.extension()
        ),
        content_type: format.content_type(),
        body,
    })
}

fn render_json(
    character: &Character,
    favorability: &Favorability,
    messages: &[ChatMessage],
    days: i64,
    now: DateTime<Utc>,
) -> Result<String, EngineError> {
    let persona = &character.persona;
    let doc = ExportDocument {
        export_info: ExportInfo {
            export_date: now,
            character_id: character.id,
            total_messages: messages.len(),
            conversation_days: days,
        },
        character: CharacterSection {
            name: &persona.name,
            nickname: persona.nickname.as_deref(),
            gender: &persona.gender,
            identity: persona.identity.as_deref(),
            personality: persona.detail_setting.as_deref(),
            background_story: persona
                .other_setting
                .background_story
                .as_deref()
                .unwrap_or_default(),
            interests: &persona.other_setting.interests,
        },
        favorability: FavorabilitySection {
            level: favorability.current_level,
            level_name: favorability.current_level.name(),
            message_count: favorability.message_count,
        },
        messages: messages
            .iter()
            .map(|m| ExportedMessage {
                timestamp: m.created_at,
                speaker: &m.speaker_name,
                content: &m.content,
                favorability_level: m.affinity_level,
            })
            .collect(),
    };

    serde_json::to_string_pretty(&doc).map_err(|e| EngineError::Store(e.into()))
}

fn render_txt(
    character: &Character,
    favorability: &Favorability,
    messages: &[ChatMessage],
    days: i64,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<String, fmt::Error> {
    let persona = &character.persona;
    let rule = "=".repeat(60);
    let level = favorability.current_level;
    let mut out = String::new();

    writeln!(out, "{}", rule)?;
    writeln!(out, "💕 {} 的對話記錄", persona.name)?;
    writeln!(out, "{}", rule)?;
    writeln!(out, "\n📊 統計資訊：")?;
    writeln!(out, "   總訊息數：{} 條", messages.len())?;
    writeln!(out, "   對話天數：{} 天", days)?;
    writeln!(out, "   好感度等級：{} - {}", level, level.name())?;
    writeln!(out, "\n✨ 角色資訊：")?;
    match persona.nickname.as_deref() {
        Some(nickname) => writeln!(out, "   名字：{} ({})", persona.name, nickname)?,
        None => writeln!(out, "   名字：{}", persona.name)?,
    }
    writeln!(out, "   性別：{}", persona.gender)?;
    if let Some(identity) = persona.identity.as_deref() {
        writeln!(out, "   身份：{}", identity)?;
    }
    if let Some(detail) = persona.detail_setting.as_deref() {
        writeln!(out, "   性格：{}", detail)?;
    }
    if let Some(story) = persona.other_setting.background_story.as_deref() {
        writeln!(out, "   背景故事：{}", story)?;
    }

    writeln!(out, "\n{}", rule)?;
    writeln!(out, "💬 對話內容")?;
    writeln!(out, "{}\n", rule)?;

    for m in messages {
        let at = m.created_at.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S");
        writeln!(out, "[{}] {}：", at, m.speaker_name)?;
        writeln!(out, "  {}\n", m.content)?;
    }

    writeln!(out, "{}", rule)?;
    writeln!(
        out,
        "匯出時間：{}",
        now.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S")
    )?;
    write!(out, "{}", rule)?;
    Ok(out)
}
