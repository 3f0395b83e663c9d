use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id                  TEXT PRIMARY KEY,
                last_analyzed_at    TEXT,
                created_at          TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE analyses (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id        TEXT NOT NULL REFERENCES users(id),
                content         TEXT NOT NULL,
                entry_count     INTEGER NOT NULL CHECK (entry_count >= 0),
                created_at      TEXT NOT NULL
            );

            CREATE INDEX idx_analyses_owner
                ON analyses(owner_id, created_at);

            CREATE TABLE entries (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id        TEXT NOT NULL REFERENCES users(id),
                question_id     INTEGER NOT NULL,
                question_text   TEXT NOT NULL,
                answer          TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                share_public    INTEGER NOT NULL DEFAULT 0,
                share_token     TEXT UNIQUE,
                analyzed_at     TEXT,
                analysis_id     INTEGER REFERENCES analyses(id)
            );

            CREATE INDEX idx_entries_backlog
                ON entries(owner_id, analyzed_at, created_at);

            -- The watermark is write-once.
            CREATE TRIGGER entries_analyzed_at_final
                BEFORE UPDATE OF analyzed_at ON entries
                WHEN OLD.analyzed_at IS NOT NULL
                 AND (NEW.analyzed_at IS NULL OR NEW.analyzed_at != OLD.analyzed_at)
            BEGIN
                SELECT RAISE(ABORT, 'analyzed_at cannot be changed once set');
            END;

            CREATE TABLE entry_messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                entry_id    INTEGER NOT NULL REFERENCES entries(id) ON DELETE CASCADE,
                role        TEXT NOT NULL CHECK (role IN ('user', 'companion')),
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_entry_messages_entry
                ON entry_messages(entry_id, id);

            CREATE TABLE sequencer_state (
                id      INTEGER PRIMARY KEY CHECK (id = 1),
                cursor  INTEGER NOT NULL CHECK (cursor >= 1)
            );

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (question served per day)");
        conn.execute_batch(
            "
            BEGIN;

            ALTER TABLE sequencer_state ADD COLUMN served_on TEXT;
            ALTER TABLE sequencer_state ADD COLUMN question_id INTEGER;
            ALTER TABLE sequencer_state ADD COLUMN question_text TEXT;

            INSERT INTO schema_version (version) VALUES (2);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
