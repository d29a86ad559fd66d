use rusqlite::{Connection, Result};

/// Initialise all core tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_materials_table(conn)?;
    create_chat_history_table(conn)?;
    create_profile_tables(conn)?;
    Ok(())
}

fn create_materials_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS materials (
            id                TEXT PRIMARY KEY,
            course_id         TEXT NOT NULL,
            name              TEXT NOT NULL,
            file_ref          TEXT NOT NULL,
            media_type        TEXT NOT NULL,
            size_bytes        INTEGER NOT NULL,
            extracted_text    TEXT,
            embedding         BLOB,
            processing_status TEXT NOT NULL DEFAULT 'pending',
            processed_at      TEXT,
            error_message     TEXT,
            created_at        TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_materials_course
            ON materials(course_id, created_at);",
    )
}

fn create_chat_history_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chat_history (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            course_id  TEXT NOT NULL,
            role       TEXT NOT NULL,
            content    TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_history_course
            ON chat_history(course_id, created_at);",
    )
}

/// Academic profile and personalization preferences are written by the
/// external profile routes; the core only reads them.
fn create_profile_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS academic (
            user_id         TEXT PRIMARY KEY,
            grades          TEXT NOT NULL DEFAULT '[]',
            semester_type   TEXT,
            semester_number INTEGER,
            subjects        TEXT NOT NULL DEFAULT '[]'
        );
        CREATE TABLE IF NOT EXISTS personalized (
            user_id TEXT PRIMARY KEY,
            prefs   TEXT NOT NULL DEFAULT '{}'
        );",
    )
}
