use crate::Database;
use crate::models::{
    CharacterFields, CharacterRow, FavorabilityRow, MessageRow, TransportLinkRow, UserRow,
};
use anyhow::{Result, anyhow};
use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, params};

/// Fixed-width UTC timestamps sort lexically in chronological order.
const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Values for a message about to be appended.
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub character_id: i64,
    pub user_id: i64,
    pub speaker_name: &'a str,
    pub from_user: bool,
    pub content: &'a str,
    pub affinity_level: u8,
    pub at: DateTime<Utc>,
}

impl Database {
    // -- Users --

    /// Idempotent: at most one row ever exists per username.
    pub fn get_or_create_user(&self, username: &str, now: DateTime<Utc>) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            let ts = format_ts(now);
            conn.execute(
                "INSERT OR IGNORE INTO users (username, created_at, last_active) VALUES (?1, ?2, ?2)",
                params![username, ts],
            )?;
            query_user_by_username(conn, username)?
                .ok_or_else(|| anyhow!("User missing after insert: {}", username))
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn touch_user(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET last_active = ?1 WHERE id = ?2",
                params![format_ts(now), id],
            )?;
            Ok(())
        })
    }

    // -- Characters --

    /// Inserts the character and its favorability tracker in one transaction.
    pub fn create_character(
        &self,
        user_id: i64,
        fields: &CharacterFields,
        now: DateTime<Utc>,
    ) -> Result<CharacterRow> {
        self.with_conn_mut(|conn| {
            let ts = format_ts(now);
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO characters
                    (user_id, name, gender, identity, nickname, detail_setting, other_setting, knowledge_base_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    user_id,
                    fields.name,
                    fields.gender,
                    fields.identity,
                    fields.nickname,
                    fields.detail_setting,
                    fields.other_setting,
                    fields.knowledge_base_id,
                    ts,
                ],
            )?;
            let character_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO favorability (character_id, user_id, message_count, current_level, last_updated)
                 VALUES (?1, ?2, 0, 1, ?3)",
                params![character_id, user_id, ts],
            )?;
            let row = query_character(&tx, character_id)?
                .ok_or_else(|| anyhow!("Character missing after insert: {}", character_id))?;
            tx.commit()?;
            Ok(row)
        })
    }

    pub fn get_character(&self, id: i64) -> Result<Option<CharacterRow>> {
        self.with_conn(|conn| query_character(conn, id))
    }

    /// Newest first.
    pub fn list_characters(&self, user_id: i64) -> Result<Vec<CharacterRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE user_id = ?1 ORDER BY created_at DESC, id DESC",
                CHARACTER_SELECT
            ))?;
            let rows = stmt
                .query_map([user_id], character_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Overwrites every persona column and re-labels the character's stored
    /// lines with the new name in the same transaction. Returns false if the
    /// character is gone.
    pub fn update_character(&self, id: i64, fields: &CharacterFields) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE characters
                 SET name = ?1, gender = ?2, identity = ?3, nickname = ?4,
                     detail_setting = ?5, other_setting = ?6, knowledge_base_id = ?7
                 WHERE id = ?8",
                params![
                    fields.name,
                    fields.gender,
                    fields.identity,
                    fields.nickname,
                    fields.detail_setting,
                    fields.other_setting,
                    fields.knowledge_base_id,
                    id,
                ],
            )?;
            if changed == 0 {
                return Ok(false);
            }
            tx.execute(
                "UPDATE messages SET speaker_name = ?1 WHERE character_id = ?2 AND from_user = 0",
                params![fields.name, id],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    /// Removes the character, its messages and its favorability tracker as
    /// one unit. Transport links pointing at it are detached, not deleted.
    pub fn delete_character(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM messages WHERE character_id = ?1", [id])?;
            tx.execute("DELETE FROM favorability WHERE character_id = ?1", [id])?;
            tx.execute(
                "UPDATE transport_links SET character_id = NULL WHERE character_id = ?1",
                [id],
            )?;
            let deleted = tx.execute("DELETE FROM characters WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(deleted > 0)
        })
    }

    // -- Messages --

    /// Appends a message. The stored timestamp is clamped to be no earlier
    /// than the character's latest message, keeping per-character order
    /// non-decreasing even if the wall clock steps back.
    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            let latest = query_latest_timestamp(conn, msg.character_id)?;
            let mut at = msg.at.trunc_subsecs(6);
            if let Some(latest) = latest {
                if latest > at {
                    at = latest;
                }
            }

            conn.execute(
                "INSERT INTO messages (character_id, user_id, speaker_name, from_user, content, created_at, affinity_level)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    msg.character_id,
                    msg.user_id,
                    msg.speaker_name,
                    msg.from_user,
                    msg.content,
                    format_ts(at),
                    msg.affinity_level,
                ],
            )?;

            Ok(MessageRow {
                id: conn.last_insert_rowid(),
                character_id: msg.character_id,
                user_id: msg.user_id,
                speaker_name: msg.speaker_name.to_string(),
                from_user: msg.from_user,
                content: msg.content.to_string(),
                created_at: at,
                affinity_level: msg.affinity_level,
            })
        })
    }

    /// Chronological history. With a limit, the oldest messages are dropped
    /// and the most recent `limit` are returned, still oldest first.
    pub fn get_messages(&self, character_id: i64, limit: Option<usize>) -> Result<Vec<MessageRow>> {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX)).unwrap_or(-1);
        self.with_conn(|conn| query_messages(conn, character_id, limit))
    }

    pub fn count_messages(&self, character_id: i64) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE character_id = ?1",
                [character_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    /// Timestamp of the minimum-timestamp message for the character.
    pub fn first_message_at(&self, character_id: i64) -> Result<Option<DateTime<Utc>>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT created_at FROM messages WHERE character_id = ?1
                 ORDER BY created_at ASC, id ASC LIMIT 1",
                [character_id],
                |row| ts_column(row, 0),
            )
            .optional()
        })
    }

    pub fn last_message_at(&self, character_id: i64) -> Result<Option<DateTime<Utc>>> {
        self.with_conn(|conn| query_latest_timestamp(conn, character_id))
    }

    // -- Favorability --

    pub fn get_favorability(&self, character_id: i64) -> Result<Option<FavorabilityRow>> {
        self.with_conn(|conn| query_favorability(conn, character_id))
    }

    /// Read-modify-write of a favorability row inside one transaction while
    /// holding the writer lock, so concurrent turns never lose an update.
    /// Returns `None` when the character has no tracker.
    pub fn update_favorability<F, T>(
        &self,
        character_id: i64,
        now: DateTime<Utc>,
        f: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce(&mut FavorabilityRow) -> T,
    {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(mut row) = query_favorability(&tx, character_id)? else {
                return Ok(None);
            };

            let out = f(&mut row);
            row.last_updated = now.trunc_subsecs(6);

            tx.execute(
                "UPDATE favorability SET message_count = ?1, current_level = ?2, last_updated = ?3
                 WHERE character_id = ?4",
                params![
                    i64::try_from(row.message_count)?,
                    row.current_level,
                    format_ts(row.last_updated),
                    character_id,
                ],
            )?;
            tx.commit()?;
            Ok(Some(out))
        })
    }

    // -- Transport links --

    /// Binds an external messaging identity to a user and (optionally) a
    /// character. An identity whose link still points at a character is left
    /// untouched and `false` is returned; a detached link is re-pointed.
    pub fn link_transport(
        &self,
        external_id: &str,
        user_id: i64,
        character_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "INSERT INTO transport_links (external_id, user_id, character_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(external_id) DO UPDATE SET
                    user_id = excluded.user_id,
                    character_id = excluded.character_id
                 WHERE transport_links.character_id IS NULL",
                params![external_id, user_id, character_id, format_ts(now)],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn get_transport_link(&self, external_id: &str) -> Result<Option<TransportLinkRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT external_id, user_id, character_id FROM transport_links WHERE external_id = ?1",
                [external_id],
                |row| {
                    Ok(TransportLinkRow {
                        external_id: row.get(0)?,
                        user_id: row.get(1)?,
                        character_id: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }
}

pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

const CHARACTER_SELECT: &str = "SELECT id, user_id, name, gender, identity, nickname, detail_setting, \
     other_setting, knowledge_base_id, created_at FROM characters";

fn character_from_row(row: &Row<'_>) -> rusqlite::Result<CharacterRow> {
    Ok(CharacterRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        gender: row.get(3)?,
        identity: row.get(4)?,
        nickname: row.get(5)?,
        detail_setting: row.get(6)?,
        other_setting: row.get(7)?,
        knowledge_base_id: row.get(8)?,
        created_at: ts_column(row, 9)?,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        created_at: ts_column(row, 2)?,
        last_active: ts_column(row, 3)?,
    })
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    conn.query_row(
        "SELECT id, username, created_at, last_active FROM users WHERE username = ?1",
        [username],
        user_from_row,
    )
    .optional()
}

fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    conn.query_row(
        "SELECT id, username, created_at, last_active FROM users WHERE id = ?1",
        [id],
        user_from_row,
    )
    .optional()
}

fn query_character(conn: &Connection, id: i64) -> Result<Option<CharacterRow>> {
    conn.query_row(
        &format!("{} WHERE id = ?1", CHARACTER_SELECT),
        [id],
        character_from_row,
    )
    .optional()
}

fn query_messages(conn: &Connection, character_id: i64, limit: i64) -> Result<Vec<MessageRow>> {
    // Newest-first slice, flipped back to chronological order.
    let mut stmt = conn.prepare(
        "SELECT id, character_id, user_id, speaker_name, from_user, content, created_at, affinity_level
         FROM (
            SELECT * FROM messages
            WHERE character_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
         )
         ORDER BY created_at ASC, id ASC",
    )?;

    let rows = stmt
        .query_map(params![character_id, limit], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                character_id: row.get(1)?,
                user_id: row.get(2)?,
                speaker_name: row.get(3)?,
                from_user: row.get(4)?,
                content: row.get(5)?,
                created_at: ts_column(row, 6)?,
                affinity_level: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_latest_timestamp(conn: &Connection, character_id: i64) -> Result<Option<DateTime<Utc>>> {
    conn.query_row(
        "SELECT created_at FROM messages WHERE character_id = ?1
         ORDER BY created_at DESC, id DESC LIMIT 1",
        [character_id],
        |row| ts_column(row, 0),
    )
    .optional()
}

fn query_favorability(conn: &Connection, character_id: i64) -> Result<Option<FavorabilityRow>> {
    conn.query_row(
        "SELECT character_id, user_id, message_count, current_level, last_updated
         FROM favorability WHERE character_id = ?1",
        [character_id],
        |row| {
            let count: i64 = row.get(2)?;
            Ok(FavorabilityRow {
                character_id: row.get(0)?,
                user_id: row.get(1)?,
                message_count: count.max(0) as u64,
                current_level: row.get(3)?,
                last_updated: ts_column(row, 4)?,
            })
        },
    )
    .optional()
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
