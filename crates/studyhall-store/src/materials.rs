use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::types::{
    blob_to_embedding, embedding_to_blob, Material, ProcessingStatus, SearchCandidate,
};

/// Error messages written to `error_message` are truncated to this length.
const MAX_ERROR_LEN: usize = 500;

/// Fields required to create a material row (status starts `pending`).
#[derive(Debug, Clone)]
pub struct NewMaterial {
    pub course_id: String,
    pub name: String,
    pub file_ref: String,
    pub media_type: String,
    pub size_bytes: u64,
}

/// Thread-safe store for material rows and their status machine.
///
/// All mutation after creation happens through the processing guards
/// below, so a material can never skip a lifecycle state.
pub struct MaterialStore {
    db: Mutex<Connection>,
}

impl MaterialStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    pub fn insert(&self, new: NewMaterial) -> Result<Material> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO materials
             (id, course_id, name, file_ref, media_type, size_bytes,
              processing_status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7)",
            rusqlite::params![
                id,
                new.course_id,
                new.name,
                new.file_ref,
                new.media_type,
                new.size_bytes as i64,
                now,
            ],
        )?;
        debug!(material_id = %id, course_id = %new.course_id, "material row created");
        Ok(Material {
            id,
            course_id: new.course_id,
            name: new.name,
            file_ref: new.file_ref,
            media_type: new.media_type,
            size_bytes: new.size_bytes,
            extracted_text: None,
            embedding: None,
            processing_status: ProcessingStatus::Pending,
            processed_at: None,
            error_message: None,
            created_at: now,
        })
    }

    pub fn get(&self, id: &str) -> Result<Option<Material>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT id, course_id, name, file_ref, media_type, size_bytes,
                    extracted_text, embedding, processing_status,
                    processed_at, error_message, created_at
             FROM materials WHERE id = ?1",
            rusqlite::params![id],
            row_to_material,
        ) {
            Ok(m) => Ok(Some(m?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// List a course's materials, oldest first.
    pub fn list_for_course(&self, course_id: &str) -> Result<Vec<Material>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, course_id, name, file_ref, media_type, size_bytes,
                    extracted_text, embedding, processing_status,
                    processed_at, error_message, created_at
             FROM materials WHERE course_id = ?1
             ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(rusqlite::params![course_id], row_to_material)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r??);
        }
        Ok(out)
    }

    /// Atomically claim a material for processing.
    ///
    /// Returns `true` only when this call performed the
    /// `pending -> processing` transition; any other current status
    /// leaves the row untouched and returns `false`, which is how
    /// concurrent or repeated processing attempts become no-ops.
    pub fn claim_for_processing(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE materials SET processing_status = 'processing'
             WHERE id = ?1 AND processing_status = 'pending'",
            rusqlite::params![id],
        )?;
        Ok(changed == 1)
    }

    /// Terminal write: extracted text, optional embedding, `completed`.
    ///
    /// This is the only path that stores extraction results, so a
    /// failed run can never leave partial data behind.
    pub fn complete(
        &self,
        id: &str,
        extracted_text: &str,
        embedding: Option<&[f32]>,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let blob = embedding.map(embedding_to_blob);
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE materials
             SET extracted_text = ?1, embedding = ?2,
                 processing_status = 'completed', processed_at = ?3,
                 error_message = NULL
             WHERE id = ?4 AND processing_status = 'processing'",
            rusqlite::params![extracted_text, blob, now, id],
        )?;
        if changed == 0 {
            return Err(StoreError::InvalidTransition {
                from: self.status_of(&db, id)?,
                to: "completed".to_string(),
            });
        }
        Ok(())
    }

    /// Terminal write: `failed` with a truncated reason.
    pub fn fail(&self, id: &str, reason: &str) -> Result<()> {
        let reason = truncate_error(reason);
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE materials
             SET processing_status = 'failed', error_message = ?1,
                 processed_at = ?2
             WHERE id = ?3 AND processing_status = 'processing'",
            rusqlite::params![reason, now, id],
        )?;
        if changed == 0 {
            return Err(StoreError::InvalidTransition {
                from: self.status_of(&db, id)?,
                to: "failed".to_string(),
            });
        }
        Ok(())
    }

    /// Administrative reset: `failed -> pending` (explicit retry), and
    /// `processing -> pending` for rows orphaned by a crash.
    ///
    /// Clears previous results so the next run starts clean.
    pub fn reset_for_retry(&self, id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE materials
             SET processing_status = 'pending', error_message = NULL,
                 extracted_text = NULL, embedding = NULL, processed_at = NULL
             WHERE id = ?1 AND processing_status IN ('failed', 'processing')",
            rusqlite::params![id],
        )?;
        if changed == 0 {
            let from = self.status_of(&db, id)?;
            return Err(StoreError::InvalidTransition {
                from,
                to: "pending".to_string(),
            });
        }
        Ok(())
    }

    /// Search-eligible rows for one course: `completed` with a stored
    /// vector. Rows whose blob fails to decode are skipped loudly —
    /// a corrupt vector must never silently distort ranking.
    pub fn search_candidates(&self, course_id: &str) -> Result<Vec<SearchCandidate>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, name, media_type, created_at, embedding,
                    COALESCE(extracted_text, '')
             FROM materials
             WHERE course_id = ?1
               AND processing_status = 'completed'
               AND embedding IS NOT NULL
             ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(rusqlite::params![course_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Vec<u8>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut out = Vec::new();
        for r in rows {
            let (material_id, name, media_type, created_at, blob, extracted_text) = r?;
            match blob_to_embedding(&blob) {
                Ok(embedding) => out.push(SearchCandidate {
                    material_id,
                    name,
                    media_type,
                    created_at,
                    embedding,
                    extracted_text,
                }),
                Err(e) => {
                    warn!(material_id = %material_id, error = %e, "skipping corrupt stored vector");
                }
            }
        }
        Ok(out)
    }

    fn status_of(&self, db: &Connection, id: &str) -> Result<String> {
        match db.query_row(
            "SELECT processing_status FROM materials WHERE id = ?1",
            rusqlite::params![id],
            |row| row.get::<_, String>(0),
        ) {
            Ok(s) => Ok(s),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(StoreError::MaterialNotFound { id: id.to_string() })
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }
}

fn truncate_error(reason: &str) -> String {
    if reason.len() <= MAX_ERROR_LEN {
        return reason.to_string();
    }
    let mut cut = MAX_ERROR_LEN;
    while !reason.is_char_boundary(cut) {
        cut -= 1;
    }
    reason[..cut].to_string()
}

fn row_to_material(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Material>> {
    use std::str::FromStr;
    let status_str: String = row.get(8)?;
    let blob: Option<Vec<u8>> = row.get(7)?;
    let embedding = match blob {
        Some(b) => match blob_to_embedding(&b) {
            Ok(v) => Some(v),
            Err(e) => return Ok(Err(e)),
        },
        None => None,
    };
    Ok(Ok(Material {
        id: row.get(0)?,
        course_id: row.get(1)?,
        name: row.get(2)?,
        file_ref: row.get(3)?,
        media_type: row.get(4)?,
        size_bytes: row.get::<_, i64>(5)? as u64,
        extracted_text: row.get(6)?,
        embedding,
        processing_status: ProcessingStatus::from_str(&status_str)
            .unwrap_or(ProcessingStatus::Failed),
        processed_at: row.get(9)?,
        error_message: row.get(10)?,
        created_at: row.get(11)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn store() -> MaterialStore {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        MaterialStore::new(conn)
    }

    fn sample(course: &str) -> NewMaterial {
        NewMaterial {
            course_id: course.to_string(),
            name: "lecture-1.pdf".to_string(),
            file_ref: "c1/lecture-1.pdf".to_string(),
            media_type: "application/pdf".to_string(),
            size_bytes: 1234,
        }
    }

    #[test]
    fn insert_starts_pending() {
        let s = store();
        let m = s.insert(sample("c1")).unwrap();
        assert_eq!(m.processing_status, ProcessingStatus::Pending);
        let fetched = s.get(&m.id).unwrap().unwrap();
        assert_eq!(fetched.processing_status, ProcessingStatus::Pending);
        assert!(fetched.extracted_text.is_none());
        assert!(fetched.embedding.is_none());
    }

    #[test]
    fn claim_is_exclusive() {
        let s = store();
        let m = s.insert(sample("c1")).unwrap();
        assert!(s.claim_for_processing(&m.id).unwrap());
        // Second claim sees `processing` and becomes a no-op.
        assert!(!s.claim_for_processing(&m.id).unwrap());
    }

    #[test]
    fn complete_requires_processing() {
        let s = store();
        let m = s.insert(sample("c1")).unwrap();
        // Cannot complete a material that was never claimed.
        assert!(s.complete(&m.id, "text", None).is_err());

        s.claim_for_processing(&m.id).unwrap();
        let emb = vec![0.5f32; 4];
        s.complete(&m.id, "some text", Some(&emb)).unwrap();
        let fetched = s.get(&m.id).unwrap().unwrap();
        assert_eq!(fetched.processing_status, ProcessingStatus::Completed);
        assert_eq!(fetched.extracted_text.as_deref(), Some("some text"));
        assert_eq!(fetched.embedding.unwrap(), emb);
        assert!(fetched.processed_at.is_some());
    }

    #[test]
    fn completed_is_terminal() {
        let s = store();
        let m = s.insert(sample("c1")).unwrap();
        s.claim_for_processing(&m.id).unwrap();
        s.complete(&m.id, "", None).unwrap();
        // Terminal: re-claim and re-fail both refuse.
        assert!(!s.claim_for_processing(&m.id).unwrap());
        assert!(s.fail(&m.id, "late failure").is_err());
    }

    #[test]
    fn fail_records_truncated_reason() {
        let s = store();
        let m = s.insert(sample("c1")).unwrap();
        s.claim_for_processing(&m.id).unwrap();
        let long_reason = "x".repeat(2000);
        s.fail(&m.id, &long_reason).unwrap();
        let fetched = s.get(&m.id).unwrap().unwrap();
        assert_eq!(fetched.processing_status, ProcessingStatus::Failed);
        assert_eq!(fetched.error_message.unwrap().len(), MAX_ERROR_LEN);
    }

    #[test]
    fn retry_resets_failed_to_pending() {
        let s = store();
        let m = s.insert(sample("c1")).unwrap();
        s.claim_for_processing(&m.id).unwrap();
        s.fail(&m.id, "ocr timeout").unwrap();

        s.reset_for_retry(&m.id).unwrap();
        let fetched = s.get(&m.id).unwrap().unwrap();
        assert_eq!(fetched.processing_status, ProcessingStatus::Pending);
        assert!(fetched.error_message.is_none());

        // Pending rows are not retryable — only failed/processing are.
        assert!(s.reset_for_retry(&m.id).is_err());
    }

    #[test]
    fn search_candidates_filter_by_course_and_eligibility() {
        let s = store();
        let a = s.insert(sample("c1")).unwrap();
        let b = s.insert(sample("c1")).unwrap();
        let other = s.insert(sample("c2")).unwrap();

        // a: completed with embedding -> eligible
        s.claim_for_processing(&a.id).unwrap();
        s.complete(&a.id, "alpha", Some(&[1.0, 0.0])).unwrap();
        // b: completed with empty text and no embedding -> ineligible
        s.claim_for_processing(&b.id).unwrap();
        s.complete(&b.id, "", None).unwrap();
        // other course: eligible but out of scope
        s.claim_for_processing(&other.id).unwrap();
        s.complete(&other.id, "gamma", Some(&[0.0, 1.0])).unwrap();

        let candidates = s.search_candidates("c1").unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].material_id, a.id);
    }

    #[test]
    fn missing_material_is_reported() {
        let s = store();
        match s.reset_for_retry("nope") {
            Err(StoreError::MaterialNotFound { id }) => assert_eq!(id, "nope"),
            other => panic!("expected MaterialNotFound, got {other:?}"),
        }
    }
}
