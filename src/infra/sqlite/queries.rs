use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::domain::entities::candidate::Candidate;
use crate::domain::entities::history::{HistoryEvent, HistoryRecord};
use crate::domain::entities::rule::Rule;
use crate::domain::entities::session::Session;
use crate::infra::sqlite::schema::open_connection;
use crate::unix_now;
use crate::usecase::ports::repo::LedgerState;

pub fn load_rule(db_path: &Path, user_id: &str, fingerprint: &str) -> Result<Option<Rule>> {
    let conn = open_connection(db_path)?;
    select_rule(&conn, user_id, fingerprint)
}

pub fn save_rule(db_path: &Path, user_id: &str, fingerprint: &str, rule: &Rule) -> Result<()> {
    let conn = open_connection(db_path)?;
    upsert_rule(&conn, user_id, fingerprint, rule)
}

pub fn load_candidates(db_path: &Path, user_id: &str, fingerprint: &str) -> Result<Vec<Candidate>> {
    let conn = open_connection(db_path)?;
    select_candidates(&conn, user_id, fingerprint)
}

/// Runs `apply` between a `BEGIN IMMEDIATE` and the commit, so concurrent
/// writers of the same database queue up instead of losing updates.
pub fn update_ledger(
    db_path: &Path,
    user_id: &str,
    fingerprint: &str,
    apply: &mut dyn FnMut(&mut LedgerState) -> bool,
) -> Result<bool> {
    let mut conn = open_connection(db_path)?;
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("failed to start ledger transaction")?;

    let mut state = LedgerState {
        rule: select_rule(&tx, user_id, fingerprint)?,
        candidates: select_candidates(&tx, user_id, fingerprint)?,
    };

    let changed = apply(&mut state);
    if !changed {
        return Ok(false);
    }

    if let Some(rule) = &state.rule {
        upsert_rule(&tx, user_id, fingerprint, rule)?;
    }
    replace_candidates(&tx, user_id, fingerprint, &state.candidates)?;

    tx.commit().context("failed to commit ledger transaction")?;
    Ok(true)
}

fn select_rule(conn: &Connection, user_id: &str, fingerprint: &str) -> Result<Option<Rule>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body_json FROM rule WHERE user_id = ?1 AND fingerprint = ?2",
            params![user_id, fingerprint],
            |row| row.get(0),
        )
        .optional()
        .context("failed to query rule")?;

    body.map(|body| {
        serde_json::from_str(&body)
            .with_context(|| format!("failed to decode rule for {user_id}/{fingerprint}"))
    })
    .transpose()
}

fn upsert_rule(conn: &Connection, user_id: &str, fingerprint: &str, rule: &Rule) -> Result<()> {
    let body = serde_json::to_string(rule).context("failed to encode rule")?;
    conn.execute(
        "INSERT INTO rule(user_id, fingerprint, body_json, version, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id, fingerprint) DO UPDATE SET
             body_json = excluded.body_json,
             version = excluded.version,
             updated_at = excluded.updated_at",
        params![user_id, fingerprint, body, rule.version(), unix_now()],
    )
    .context("failed to upsert rule")?;
    Ok(())
}

fn select_candidates(conn: &Connection, user_id: &str, fingerprint: &str) -> Result<Vec<Candidate>> {
    let mut stmt = conn
        .prepare(
            "SELECT body_json FROM candidate
             WHERE user_id = ?1 AND fingerprint = ?2
             ORDER BY position",
        )
        .context("failed to prepare candidate query")?;

    let bodies = stmt
        .query_map(params![user_id, fingerprint], |row| row.get::<_, String>(0))
        .context("failed to query candidates")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to read candidate rows")?;

    bodies
        .iter()
        .map(|body| serde_json::from_str(body).context("failed to decode candidate"))
        .collect()
}

fn replace_candidates(
    conn: &Connection,
    user_id: &str,
    fingerprint: &str,
    candidates: &[Candidate],
) -> Result<()> {
    conn.execute(
        "DELETE FROM candidate WHERE user_id = ?1 AND fingerprint = ?2",
        params![user_id, fingerprint],
    )
    .context("failed to clear candidates")?;

    let mut insert = conn
        .prepare(
            "INSERT INTO candidate(user_id, fingerprint, key, position, body_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .context("failed to prepare candidate insert")?;

    for (position, candidate) in candidates.iter().enumerate() {
        let body = serde_json::to_string(candidate).context("failed to encode candidate")?;
        insert
            .execute(params![
                user_id,
                fingerprint,
                candidate.key,
                position as i64,
                body
            ])
            .context("failed to insert candidate")?;
    }

    Ok(())
}

pub fn load_session(db_path: &Path, session_id: &str) -> Result<Option<Session>> {
    let conn = open_connection(db_path)?;
    let row: Option<(String, bool)> = conn
        .query_row(
            "SELECT body_json, confirming FROM session WHERE session_id = ?1",
            [session_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .context("failed to query session")?;

    row.map(|(body, confirming)| {
        let mut session: Session = serde_json::from_str(&body)
            .with_context(|| format!("failed to decode session {session_id}"))?;
        session.confirming = confirming;
        Ok(session)
    })
    .transpose()
}

pub fn save_session(db_path: &Path, session: &Session) -> Result<()> {
    let conn = open_connection(db_path)?;
    let body = serde_json::to_string(session).context("failed to encode session")?;
    conn.execute(
        "INSERT INTO session(session_id, user_id, body_json, confirming, updated_at)
         VALUES (?1, ?2, ?3, 0, ?4)
         ON CONFLICT(session_id) DO UPDATE SET
             user_id = excluded.user_id,
             body_json = excluded.body_json,
             updated_at = excluded.updated_at",
        params![session.session_id, session.user_id, body, session.updated_at],
    )
    .context("failed to upsert session")?;
    Ok(())
}

pub fn try_begin_confirm(db_path: &Path, session_id: &str) -> Result<bool> {
    let conn = open_connection(db_path)?;
    let updated = conn
        .execute(
            "UPDATE session SET confirming = 1 WHERE session_id = ?1 AND confirming = 0",
            [session_id],
        )
        .context("failed to set confirm lock")?;
    Ok(updated == 1)
}

pub fn end_confirm(db_path: &Path, session_id: &str) -> Result<()> {
    let conn = open_connection(db_path)?;
    conn.execute(
        "UPDATE session SET confirming = 0 WHERE session_id = ?1",
        [session_id],
    )
    .context("failed to clear confirm lock")?;
    Ok(())
}

pub fn sweep_expired_sessions(db_path: &Path, cutoff: i64) -> Result<usize> {
    let conn = open_connection(db_path)?;
    let deleted = conn
        .execute("DELETE FROM session WHERE updated_at < ?1", [cutoff])
        .context("failed to sweep sessions")?;
    Ok(deleted)
}

pub fn append_history(db_path: &Path, user_id: &str, event: &HistoryEvent) -> Result<()> {
    let conn = open_connection(db_path)?;
    let body = serde_json::to_string(event).context("failed to encode history event")?;
    conn.execute(
        "INSERT INTO history(user_id, event_json, created_at) VALUES (?1, ?2, ?3)",
        params![user_id, body, unix_now()],
    )
    .context("failed to insert history event")?;
    Ok(())
}

pub fn load_history(db_path: &Path, user_id: &str) -> Result<Vec<HistoryRecord>> {
    let conn = open_connection(db_path)?;
    let mut stmt = conn
        .prepare("SELECT event_json, created_at FROM history WHERE user_id = ?1 ORDER BY id")
        .context("failed to prepare history query")?;

    let rows = stmt
        .query_map([user_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })
        .context("failed to query history")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to read history rows")?;

    rows.into_iter()
        .map(|(body, created_at)| {
            let event: HistoryEvent =
                serde_json::from_str(&body).context("failed to decode history event")?;
            Ok(HistoryRecord {
                user_id: user_id.to_string(),
                created_at,
                event,
            })
        })
        .collect()
}

pub fn reset_history(db_path: &Path, user_id: &str) -> Result<()> {
    let conn = open_connection(db_path)?;
    conn.execute("DELETE FROM history WHERE user_id = ?1", [user_id])
        .context("failed to reset history")?;
    Ok(())
}
