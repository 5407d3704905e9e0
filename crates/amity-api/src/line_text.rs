//! Scrubs completion output before it reaches a chat-platform user. Markup
//! and stray English action words are dropped; Chinese text, emoji and
//! capitalised names are kept.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

/// Sent instead of an empty message.
pub const EMPTY_FALLBACK: &str = "...";

static RE_ANGLE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static RE_SQUARE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[a-zA-Z0-9_]+\]").unwrap());
static RE_CURLY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[a-zA-Z0-9_]+\}").unwrap());
static RE_WORD_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[a-zA-Z]+\n").unwrap());
static RE_WORD_PAREN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[a-zA-Z]+\s*\(").unwrap());
// Lowercase-led words of two or more letters. The leading group stands in
// for a "not preceded by a letter" check and is written back.
static RE_LOWER_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[^a-zA-Z])[a-z]{2,}[a-zA-Z]*").unwrap());
static RE_ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:teleport|dampen|iteleport|activate|trigger|summon|cast|invoke|perform|execute|initiate)\b",
    )
    .unwrap()
});
static RE_BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());
static RE_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" +").unwrap());
static RE_EMPTY_PARENS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(\s*\)").unwrap());

fn strip_tags(text: &str) -> String {
    let text = RE_ANGLE_TAG.replace_all(text, "");
    let text = RE_SQUARE_TAG.replace_all(&text, "");
    RE_CURLY_TAG.replace_all(&text, "").into_owned()
}

fn strip_actions(text: &str) -> String {
    let text = RE_WORD_LINE.replace_all(text, "");
    let text = RE_WORD_PAREN.replace_all(&text, "(");
    let text = RE_LOWER_WORD.replace_all(&text, "${1}");
    let text = RE_ACTION.replace_all(&text, "");
    let text = RE_BLANK_LINES.replace_all(&text, "\n");
    let text = RE_SPACES.replace_all(&text, " ");
    RE_EMPTY_PARENS.replace_all(text.trim(), "").into_owned()
}

/// Never returns an empty string.
pub fn clean_for_line(text: &str) -> String {
    let cleaned = strip_actions(&strip_tags(text));
    if cleaned.trim().is_empty() {
        warn!("Cleaning left nothing of a {}-byte message", text.len());
        return EMPTY_FALLBACK.to_string();
    }
    let removed = text.len().saturating_sub(cleaned.len());
    if removed > 10 {
        debug!("Cleaning removed {} bytes", removed);
    }
    cleaned
}
