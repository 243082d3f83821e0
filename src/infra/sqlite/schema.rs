use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::Connection;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn open_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("failed to open db: {}", db_path.display()))?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;
    conn.execute("PRAGMA foreign_keys = ON", [])
        .context("failed to enable foreign key enforcement")?;
    Ok(conn)
}

pub fn init_db(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent dir: {}", parent.display()))?;
    }

    let conn = open_connection(db_path)?;

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS rule (
            user_id     TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            body_json   TEXT NOT NULL,
            version     INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL,
            PRIMARY KEY (user_id, fingerprint)
        );

        CREATE TABLE IF NOT EXISTS candidate (
            user_id     TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            key         TEXT NOT NULL,
            position    INTEGER NOT NULL,
            body_json   TEXT NOT NULL,
            PRIMARY KEY (user_id, fingerprint, key)
        );

        CREATE TABLE IF NOT EXISTS session (
            session_id  TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            body_json   TEXT NOT NULL,
            confirming  INTEGER NOT NULL DEFAULT 0,
            updated_at  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS history (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     TEXT NOT NULL,
            event_json  TEXT NOT NULL,
            created_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_candidate_key_position
            ON candidate(user_id, fingerprint, position);

        CREATE INDEX IF NOT EXISTS idx_session_updated_at
            ON session(updated_at);

        CREATE INDEX IF NOT EXISTS idx_history_user
            ON history(user_id, id);
        ",
    )
    .context("failed to initialize schema")?;

    Ok(())
}
