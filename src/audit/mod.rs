use rusqlite::{Connection, params};
use serde_json::Value;

/// How long audit entries are kept before startup cleanup removes them.
const RETENTION_DAYS: i64 = 90;

#[derive(Debug, Clone, serde::Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub user_id: i64,
    pub action: String,
    pub target_type: String,
    pub target_id: i64,
    pub details: String,
    pub created_at: String,
}

/// Record an audit entry. Callers ignore the result by convention (audit
/// failures must never fail the underlying operation).
pub fn log(
    conn: &Connection,
    user_id: i64,
    action: &str,
    target_type: &str,
    target_id: i64,
    details: Value,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO audit_log (user_id, action, target_type, target_id, details)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user_id, action, target_type, target_id, details.to_string()],
    )?;
    Ok(())
}

pub fn list_recent(conn: &Connection, limit: i64) -> Result<Vec<AuditEntry>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, action, target_type, target_id, details, created_at
         FROM audit_log ORDER BY id DESC LIMIT ?1",
    )?;
    let entries = stmt
        .query_map(params![limit], |row| {
            Ok(AuditEntry {
                id: row.get(0)?,
                user_id: row.get(1)?,
                action: row.get(2)?,
                target_type: row.get(3)?,
                target_id: row.get(4)?,
                details: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

pub fn cleanup_old_entries(conn: &Connection) {
    let result = conn.execute(
        "DELETE FROM audit_log WHERE created_at < datetime('now', ?1)",
        params![format!("-{} days", RETENTION_DAYS)],
    );
    match result {
        Ok(n) if n > 0 => log::info!("Audit cleanup removed {} entries", n),
        Ok(_) => {}
        Err(e) => log::error!("Audit cleanup failed: {}", e),
    }
}
