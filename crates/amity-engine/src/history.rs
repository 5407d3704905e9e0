//! Bounded context window forwarded upstream on each turn.

use amity_db::Database;
use amity_db::models::MessageRow;
use anyhow::Result;

use crate::completion::DialogueTurn;

/// Most recent `size` messages for the character, oldest first. Rebuilt from
/// the store on every call.
pub fn window(db: &Database, character_id: i64, size: usize) -> Result<Vec<MessageRow>> {
    db.get_messages(character_id, Some(size))
}

/// Names come from each row's role, so a renamed character or user never
/// shows up upstream under a stale name.
pub fn dialogue(rows: &[MessageRow], user_name: &str, character_name: &str) -> Vec<DialogueTurn> {
    rows.iter()
        .map(|row| {
            let name = if row.from_user { user_name } else { character_name };
            DialogueTurn {
                name: name.to_string(),
                content: row.content.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use amity_db::models::CharacterFields;
    use amity_db::queries::NewMessage;
    use chrono::{DateTime, Duration, Utc};

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-05-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn seeded(count: i64) -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let user = db.get_or_create_user("阿哲", t0()).unwrap();
        let fields = CharacterFields {
            name: "小雨".into(),
            gender: "女".into(),
            other_setting: "{}".into(),
            ..Default::default()
        };
        let character = db.create_character(user.id, &fields, t0()).unwrap();
        for i in 0..count {
            let speaker = if i % 2 == 0 { "阿哲" } else { "小雨" };
            db.insert_message(&NewMessage {
                character_id: character.id,
                user_id: user.id,
                speaker_name: speaker,
                from_user: i % 2 == 0,
                content: &format!("line {}", i),
                affinity_level: 1,
                at: t0() + Duration::seconds(i),
            })
            .unwrap();
        }
        (db, character.id)
    }

    #[test]
    fn short_history_is_returned_whole() {
        let (db, id) = seeded(4);
        let rows = window(&db, id, 100).unwrap();
        let contents: Vec<&str> = rows.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["line 0", "line 1", "line 2", "line 3"]);
    }

    #[test]
    fn long_history_keeps_the_newest() {
        let (db, id) = seeded(7);
        let rows = window(&db, id, 3).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].content, "line 4");
        assert_eq!(rows[2].content, "line 6");
        assert!(rows.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[test]
    fn dialogue_preserves_speakers() {
        let (db, id) = seeded(2);
        let turns = dialogue(&window(&db, id, 10).unwrap(), "阿哲", "小雨");
        assert_eq!(turns[0].name, "阿哲");
        assert_eq!(turns[1].name, "小雨");
        assert_eq!(turns[1].content, "line 1");
    }

    #[test]
    fn dialogue_uses_current_names() {
        let (db, id) = seeded(4);
        let turns = dialogue(&window(&db, id, 10).unwrap(), "阿哲", "小晴");
        let names: Vec<&str> = turns.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["阿哲", "小晴", "阿哲", "小晴"]);
    }
}
