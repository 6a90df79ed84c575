use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::errors::AppError;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_VERIFIED: &str = "verified";
pub const STATUS_REJECTED: &str = "rejected";

#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: i64,
    pub application_id: i64,
    pub document_type: String,
    pub file_name: String,
    pub verification_status: String,
    pub confidence: Option<f64>,
    pub uploaded_by: i64,
    pub created_at: String,
    pub verified_at: Option<String>,
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get("id")?,
        application_id: row.get("application_id")?,
        document_type: row.get("document_type")?,
        file_name: row.get("file_name")?,
        verification_status: row.get("verification_status")?,
        confidence: row.get("confidence")?,
        uploaded_by: row.get("uploaded_by")?,
        created_at: row.get("created_at")?,
        verified_at: row.get("verified_at")?,
    })
}

const SELECT_DOCUMENT: &str = "\
    SELECT id, application_id, document_type, file_name, verification_status, \
           confidence, uploaded_by, created_at, verified_at \
    FROM documents";

pub fn create(
    conn: &Connection,
    application_id: i64,
    document_type: &str,
    file_name: &str,
    uploaded_by: i64,
) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO documents (application_id, document_type, file_name, uploaded_by) \
         VALUES (?1, ?2, ?3, ?4)",
        params![application_id, document_type, file_name, uploaded_by],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Document>, AppError> {
    let sql = format!("{SELECT_DOCUMENT} WHERE id = ?1");
    let document = conn
        .query_row(&sql, params![id], row_to_document)
        .optional()?;
    Ok(document)
}

pub fn list_for_application(
    conn: &Connection,
    application_id: i64,
) -> Result<Vec<Document>, AppError> {
    let sql = format!("{SELECT_DOCUMENT} WHERE application_id = ?1 ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let documents = stmt
        .query_map(params![application_id], row_to_document)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(documents)
}

/// Record the verification outcome from the document analyzer.
pub fn set_verification(
    conn: &Connection,
    id: i64,
    status: &str,
    confidence: f64,
) -> Result<(), AppError> {
    let changed = conn.execute(
        "UPDATE documents SET verification_status = ?1, confidence = ?2, \
         verified_at = datetime('now') WHERE id = ?3",
        params![status, confidence, id],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

/// Document types with at least one verified upload for an application.
pub fn verified_types(conn: &Connection, application_id: i64) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT document_type FROM documents \
         WHERE application_id = ?1 AND verification_status = ?2 ORDER BY document_type",
    )?;
    let types = stmt
        .query_map(params![application_id, STATUS_VERIFIED], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(types)
}
