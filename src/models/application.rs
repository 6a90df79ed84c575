use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde_json::Value;

use crate::errors::AppError;

/// An applicant's enrollment application. `data` is the JSON bag the
/// condition evaluator reads fields from. The current-stage pointer and
/// `status_version` are written only inside the engine's transition
/// transaction.
#[derive(Debug, Clone, Serialize)]
pub struct Application {
    pub id: i64,
    pub applicant_user_id: i64,
    pub application_type: String,
    pub data: Value,
    pub current_stage_id: Option<i64>,
    pub current_status_id: Option<i64>,
    pub status_version: i64,
    pub is_terminal: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// One append-only status history record. Never updated or deleted after
/// creation; this is the audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct StatusRecord {
    pub id: i64,
    pub application_id: i64,
    pub workflow_stage_id: Option<i64>,
    pub status: String,
    pub notes: String,
    pub created_by_user_id: i64,
    pub created_at: String,
}

const SELECT_APPLICATION: &str = "\
    SELECT id, applicant_user_id, application_type, data, current_stage_id, \
           current_status_id, status_version, is_terminal, created_at, updated_at \
    FROM applications";

fn row_to_application(row: &rusqlite::Row) -> rusqlite::Result<Application> {
    let data: String = row.get("data")?;
    Ok(Application {
        id: row.get("id")?,
        applicant_user_id: row.get("applicant_user_id")?,
        application_type: row.get("application_type")?,
        data: serde_json::from_str(&data).unwrap_or(Value::Null),
        current_stage_id: row.get("current_stage_id")?,
        current_status_id: row.get("current_status_id")?,
        status_version: row.get("status_version")?,
        is_terminal: row.get::<_, i64>("is_terminal")? != 0,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_status(row: &rusqlite::Row) -> rusqlite::Result<StatusRecord> {
    Ok(StatusRecord {
        id: row.get("id")?,
        application_id: row.get("application_id")?,
        workflow_stage_id: row.get("workflow_stage_id")?,
        status: row.get("status")?,
        notes: row.get("notes")?,
        created_by_user_id: row.get("created_by_user_id")?,
        created_at: row.get("created_at")?,
    })
}

pub fn create(
    conn: &Connection,
    applicant_user_id: i64,
    application_type: &str,
    data: &Value,
) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO applications (applicant_user_id, application_type, data) \
         VALUES (?1, ?2, ?3)",
        params![applicant_user_id, application_type, data.to_string()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Application>, AppError> {
    let sql = format!("{SELECT_APPLICATION} WHERE id = ?1");
    let application = conn
        .query_row(&sql, params![id], row_to_application)
        .optional()?;
    Ok(application)
}

pub fn list_all(conn: &Connection) -> Result<Vec<Application>, AppError> {
    let sql = format!("{SELECT_APPLICATION} ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let applications = stmt
        .query_map([], row_to_application)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(applications)
}

pub fn list_for_applicant(conn: &Connection, user_id: i64) -> Result<Vec<Application>, AppError> {
    let sql = format!("{SELECT_APPLICATION} WHERE applicant_user_id = ?1 ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let applications = stmt
        .query_map(params![user_id], row_to_application)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(applications)
}

/// Applications the automatic transition scanner should look at:
/// initialized and not yet terminal.
pub fn list_in_flight_ids(conn: &Connection) -> Result<Vec<i64>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT id FROM applications \
         WHERE current_status_id IS NOT NULL AND is_terminal = 0 ORDER BY id",
    )?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}

/// Replace the application's data bag. Allowed at any point before a
/// terminal stage; conditions are re-evaluated from fresh data on the
/// next scanner pass or transition attempt.
pub fn update_data(conn: &Connection, id: i64, data: &Value) -> Result<(), AppError> {
    let changed = conn.execute(
        "UPDATE applications SET data = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![data.to_string(), id],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

/// Status history, chronological, oldest first.
pub fn status_history(conn: &Connection, application_id: i64) -> Result<Vec<StatusRecord>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT id, application_id, workflow_stage_id, status, notes, created_by_user_id, \
         created_at FROM application_statuses \
         WHERE application_id = ?1 ORDER BY created_at, id",
    )?;
    let records = stmt
        .query_map(params![application_id], row_to_status)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(records)
}

pub fn find_status_by_id(conn: &Connection, status_id: i64) -> Result<Option<StatusRecord>, AppError> {
    let record = conn
        .query_row(
            "SELECT id, application_id, workflow_stage_id, status, notes, created_by_user_id, \
             created_at FROM application_statuses WHERE id = ?1",
            params![status_id],
            row_to_status,
        )
        .optional()?;
    Ok(record)
}

/// Record a fulfilled required action (e.g. "fee_paid"). Idempotent.
pub fn complete_action(
    conn: &Connection,
    application_id: i64,
    action: &str,
    completed_by: i64,
) -> Result<(), AppError> {
    conn.execute(
        "INSERT OR IGNORE INTO application_actions (application_id, action, completed_by) \
         VALUES (?1, ?2, ?3)",
        params![application_id, action, completed_by],
    )?;
    Ok(())
}

pub fn completed_actions(conn: &Connection, application_id: i64) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT action FROM application_actions WHERE application_id = ?1 ORDER BY action",
    )?;
    let actions = stmt
        .query_map(params![application_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(actions)
}
