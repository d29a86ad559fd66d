use std::sync::Mutex;

use rusqlite::Connection;
use tracing::debug;

use crate::error::Result;
use crate::types::{ChatTurn, TurnRole};

/// Append-only chat history, totally ordered per course by
/// `(created_at, id)`.
pub struct HistoryStore {
    db: Mutex<Connection>,
}

impl HistoryStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Append a completed `(user, model)` exchange in one transaction.
    ///
    /// The pair is all-or-nothing: a turn is never visible without its
    /// response, and a failed generation never reaches this method.
    pub fn append_turn_pair(
        &self,
        course_id: &str,
        user_content: &str,
        model_content: &str,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        tx.execute(
            "INSERT INTO chat_history (course_id, role, content, created_at)
             VALUES (?1, 'user', ?2, ?3)",
            rusqlite::params![course_id, user_content, now],
        )?;
        tx.execute(
            "INSERT INTO chat_history (course_id, role, content, created_at)
             VALUES (?1, 'model', ?2, ?3)",
            rusqlite::params![course_id, model_content, now],
        )?;
        tx.commit()?;
        debug!(course_id = %course_id, "turn pair appended");
        Ok(())
    }

    /// The most recent `limit` turns, returned oldest first.
    pub fn recent(&self, course_id: &str, limit: usize) -> Result<Vec<ChatTurn>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, course_id, role, content, created_at
             FROM chat_history
             WHERE course_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![course_id, limit as i64], row_to_turn)?;
        let mut turns: Vec<ChatTurn> = rows.filter_map(|r| r.ok()).collect();
        // Read newest-first for the bound, then flip to chronological.
        turns.reverse();
        Ok(turns)
    }

    pub fn count(&self, course_id: &str) -> Result<u64> {
        let db = self.db.lock().unwrap();
        let n: i64 = db.query_row(
            "SELECT COUNT(*) FROM chat_history WHERE course_id = ?1",
            rusqlite::params![course_id],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}

fn row_to_turn(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatTurn> {
    let role_str: String = row.get(2)?;
    Ok(ChatTurn {
        id: row.get(0)?,
        course_id: row.get(1)?,
        role: role_str.parse().unwrap_or(TurnRole::User),
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}
