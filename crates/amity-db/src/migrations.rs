use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        // AUTOINCREMENT keeps ids from being reused after a delete.
        conn.execute_batch(
            "
            CREATE TABLE users (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                username     TEXT NOT NULL UNIQUE,
                created_at   TEXT NOT NULL,
                last_active  TEXT NOT NULL
            );

            CREATE TABLE characters (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id            INTEGER NOT NULL REFERENCES users(id),
                name               TEXT NOT NULL,
                gender             TEXT NOT NULL,
                identity           TEXT,
                nickname           TEXT,
                detail_setting     TEXT,
                other_setting      TEXT NOT NULL DEFAULT '{}',
                knowledge_base_id  TEXT,
                created_at         TEXT NOT NULL
            );

            CREATE INDEX idx_characters_user
                ON characters(user_id, created_at);

            CREATE TABLE messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                character_id    INTEGER NOT NULL REFERENCES characters(id),
                user_id         INTEGER NOT NULL REFERENCES users(id),
                speaker_name    TEXT NOT NULL,
                content         TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                affinity_level  INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX idx_messages_character
                ON messages(character_id, created_at, id);

            CREATE TABLE favorability (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                character_id   INTEGER NOT NULL UNIQUE REFERENCES characters(id),
                user_id        INTEGER NOT NULL REFERENCES users(id),
                message_count  INTEGER NOT NULL DEFAULT 0,
                current_level  INTEGER NOT NULL DEFAULT 1,
                last_updated   TEXT NOT NULL
            );

            CREATE TABLE transport_links (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id   TEXT NOT NULL UNIQUE,
                user_id       INTEGER NOT NULL REFERENCES users(id),
                character_id  INTEGER REFERENCES characters(id),
                created_at    TEXT NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (message speaker role)");
        // Rows written before v2 are attributed by matching the owner's name.
        conn.execute_batch(
            "
            ALTER TABLE messages ADD COLUMN from_user INTEGER NOT NULL DEFAULT 0;

            UPDATE messages SET from_user = 1
            WHERE speaker_name = (SELECT username FROM users WHERE users.id = messages.user_id);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v2_backfills_speaker_roles() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE schema_version (version INTEGER NOT NULL);
            INSERT INTO schema_version (version) VALUES (1);
            CREATE TABLE users (id INTEGER PRIMARY KEY, username TEXT NOT NULL);
            CREATE TABLE messages (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                speaker_name TEXT NOT NULL
            );
            INSERT INTO users (id, username) VALUES (1, '阿哲');
            INSERT INTO messages (id, user_id, speaker_name) VALUES (1, 1, '阿哲'), (2, 1, '小雨');
            ",
        )
        .unwrap();

        run(&conn).unwrap();
        run(&conn).unwrap();

        let roles: Vec<bool> = conn
            .prepare("SELECT from_user FROM messages ORDER BY id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(roles, vec![true, false]);

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }
}
