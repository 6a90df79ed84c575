use rusqlite::{Connection, params};
use serde::Serialize;

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: i64,
    pub application_id: i64,
    pub sender_user_id: i64,
    pub sender_name: String,
    pub body: String,
    pub created_at: String,
    pub read_at: Option<String>,
}

pub fn create(
    conn: &Connection,
    application_id: i64,
    sender_user_id: i64,
    body: &str,
) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO messages (application_id, sender_user_id, body) VALUES (?1, ?2, ?3)",
        params![application_id, sender_user_id, body],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_for_application(
    conn: &Connection,
    application_id: i64,
) -> Result<Vec<Message>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT m.id, m.application_id, m.sender_user_id, \
                COALESCE(u.display_name, '') AS sender_name, \
                m.body, m.created_at, m.read_at \
         FROM messages m \
         LEFT JOIN users u ON m.sender_user_id = u.id \
         WHERE m.application_id = ?1 ORDER BY m.created_at, m.id",
    )?;
    let messages = stmt
        .query_map(params![application_id], |row| {
            Ok(Message {
                id: row.get("id")?,
                application_id: row.get("application_id")?,
                sender_user_id: row.get("sender_user_id")?,
                sender_name: row.get("sender_name")?,
                body: row.get("body")?,
                created_at: row.get("created_at")?,
                read_at: row.get("read_at")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(messages)
}

/// Mark every message on the application not sent by the reader as read.
pub fn mark_read(conn: &Connection, application_id: i64, reader_user_id: i64) -> Result<usize, AppError> {
    let changed = conn.execute(
        "UPDATE messages SET read_at = datetime('now') \
         WHERE application_id = ?1 AND sender_user_id != ?2 AND read_at IS NULL",
        params![application_id, reader_user_id],
    )?;
    Ok(changed)
}
