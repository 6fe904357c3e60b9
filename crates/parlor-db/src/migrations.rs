use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            role        TEXT NOT NULL DEFAULT 'basic',
            created_at  TEXT NOT NULL
        );

        -- author is a JSON snapshot of the poster, not a foreign key
        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            text        TEXT NOT NULL,
            author      TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_created
            ON messages(created_at);

        CREATE TABLE IF NOT EXISTS sessions (
            id               TEXT PRIMARY KEY,
            user_id          TEXT,
            trivia_question  TEXT,
            trivia_answer    TEXT,
            wrong_answer     INTEGER NOT NULL DEFAULT 0,
            flash            TEXT,
            created_at       TEXT NOT NULL,
            expires_at       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_expires
            ON sessions(expires_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
