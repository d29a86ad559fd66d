use std::sync::Mutex;

use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::types::{AcademicProfile, Preferences};

/// Read-only access to academic profiles and personalization
/// preferences. The external profile routes own all writes.
pub struct ProfileStore {
    db: Mutex<Connection>,
}

impl ProfileStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    pub fn academic(&self, user_id: &str) -> Result<Option<AcademicProfile>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT user_id, grades, semester_type, semester_number, subjects
             FROM academic WHERE user_id = ?1",
            rusqlite::params![user_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        ) {
            Ok((user_id, grades_json, semester_type, semester_number, subjects_json)) => {
                Ok(Some(AcademicProfile {
                    user_id,
                    grades: serde_json::from_str(&grades_json).unwrap_or_default(),
                    semester_type,
                    semester_number,
                    subjects: serde_json::from_str(&subjects_json).unwrap_or_default(),
                }))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    pub fn preferences(&self, user_id: &str) -> Result<Option<Preferences>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT prefs FROM personalized WHERE user_id = ?1",
            rusqlite::params![user_id],
            |row| row.get::<_, String>(0),
        ) {
            Ok(prefs_json) => Ok(Some(
                serde_json::from_str(&prefs_json).unwrap_or_default(),
            )),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn seeded_store() -> ProfileStore {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        conn.execute(
            "INSERT INTO academic (user_id, grades, semester_type, semester_number, subjects)
             VALUES ('u1', '[\"A\",\"B\"]', 'winter', 3, '[\"biology\",\"chemistry\"]')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO personalized (user_id, prefs)
             VALUES ('u1', '{\"detail_level\":\"high\",\"learning_pace\":\"slow\"}')",
            [],
        )
        .unwrap();
        ProfileStore::new(conn)
    }

    #[test]
    fn academic_profile_reads_back() {
        let s = seeded_store();
        let p = s.academic("u1").unwrap().unwrap();
        assert_eq!(p.grades, vec!["A", "B"]);
        assert_eq!(p.semester_type.as_deref(), Some("winter"));
        assert_eq!(p.semester_number, Some(3));
        assert_eq!(p.subjects, vec!["biology", "chemistry"]);
    }

    #[test]
    fn preferences_are_sparse() {
        let s = seeded_store();
        let prefs = s.preferences("u1").unwrap().unwrap();
        assert_eq!(prefs.detail_level.as_deref(), Some("high"));
        assert_eq!(prefs.learning_pace.as_deref(), Some("slow"));
        assert!(prefs.prior_experience.is_none());
        assert!(prefs.tone.is_none());
    }

    #[test]
    fn missing_user_yields_none() {
        let s = seeded_store();
        assert!(s.academic("ghost").unwrap().is_none());
        assert!(s.preferences("ghost").unwrap().is_none());
    }
}
