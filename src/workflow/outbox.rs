//! Durable side-effect outbox.
//!
//! The engine writes intent rows inside the same transaction as the
//! status change; this module's dispatcher drains them afterwards. A
//! failing delivery is retried with exponential backoff and, once the
//! attempt budget is exhausted, parked as `failed` for the operator
//! queue. Nothing here ever re-attempts the state transition itself.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::{Connection, params};
use serde::Serialize;
use serde_json::{Value, json};

use crate::db::DbPool;
use crate::errors::AppError;
use crate::integrations::{IntegrationSync, NotificationDispatcher};
use crate::models::workflow::WorkflowStage;

pub const KIND_NOTIFICATION: &str = "notification";
pub const KIND_SIS_SYNC: &str = "sis_sync";

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_DISPATCHED: &str = "dispatched";
pub const STATUS_FAILED: &str = "failed";

const MAX_ATTEMPTS: i64 = 5;
const BASE_BACKOFF_SECS: i64 = 30;

#[derive(Debug, Clone, Serialize)]
pub struct OutboxEntry {
    pub id: i64,
    pub application_id: i64,
    pub kind: String,
    pub payload: Value,
    pub status: String,
    pub attempts: i64,
    pub next_attempt_at: String,
    pub last_error: Option<String>,
    pub created_at: String,
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<OutboxEntry> {
    let payload: String = row.get("payload")?;
    Ok(OutboxEntry {
        id: row.get("id")?,
        application_id: row.get("application_id")?,
        kind: row.get("kind")?,
        payload: serde_json::from_str(&payload).unwrap_or(Value::Null),
        status: row.get("status")?,
        attempts: row.get("attempts")?,
        next_attempt_at: row.get("next_attempt_at")?,
        last_error: row.get("last_error")?,
        created_at: row.get("created_at")?,
    })
}

pub fn enqueue(
    conn: &Connection,
    application_id: i64,
    kind: &str,
    payload: &Value,
) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO side_effect_outbox (application_id, kind, payload) VALUES (?1, ?2, ?3)",
        params![application_id, kind, payload.to_string()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Queue one notification intent per trigger configured on the stage the
/// application just entered. Called inside the transition transaction.
pub fn enqueue_stage_entry(
    conn: &Connection,
    application_id: i64,
    stage: &WorkflowStage,
) -> Result<(), AppError> {
    for trigger in &stage.notification_triggers {
        enqueue(
            conn,
            application_id,
            KIND_NOTIFICATION,
            &json!({
                "event": trigger.event,
                "audience": trigger.audience,
                "stage": stage.name,
                "application_id": application_id,
            }),
        )?;
    }
    Ok(())
}

/// Queue a SIS/LMS sync intent for a status change.
pub fn enqueue_sync(conn: &Connection, application_id: i64, stage_name: &str) -> Result<(), AppError> {
    enqueue(
        conn,
        application_id,
        KIND_SIS_SYNC,
        &json!({ "application_id": application_id, "stage": stage_name }),
    )?;
    Ok(())
}

fn due_entries(conn: &Connection, limit: i64) -> Result<Vec<OutboxEntry>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT id, application_id, kind, payload, status, attempts, next_attempt_at, \
         last_error, created_at \
         FROM side_effect_outbox \
         WHERE status = ?1 AND next_attempt_at <= datetime('now') \
         ORDER BY id LIMIT ?2",
    )?;
    let entries = stmt
        .query_map(params![STATUS_PENDING, limit], row_to_entry)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

fn mark_dispatched(conn: &Connection, id: i64) -> Result<(), AppError> {
    conn.execute(
        "UPDATE side_effect_outbox SET status = ?1, last_error = NULL WHERE id = ?2",
        params![STATUS_DISPATCHED, id],
    )?;
    Ok(())
}

fn mark_attempt_failed(conn: &Connection, entry: &OutboxEntry, error: &str) -> Result<(), AppError> {
    let attempts = entry.attempts + 1;
    if attempts >= MAX_ATTEMPTS {
        conn.execute(
            "UPDATE side_effect_outbox SET status = ?1, attempts = ?2, last_error = ?3 \
             WHERE id = ?4",
            params![STATUS_FAILED, attempts, error, entry.id],
        )?;
        log::error!(
            "Outbox entry {} ({}) dead-lettered after {} attempts: {}",
            entry.id,
            entry.kind,
            attempts,
            error
        );
    } else {
        let backoff = BASE_BACKOFF_SECS << (attempts - 1);
        conn.execute(
            "UPDATE side_effect_outbox SET attempts = ?1, last_error = ?2, \
             next_attempt_at = datetime('now', ?3) WHERE id = ?4",
            params![attempts, error, format!("+{} seconds", backoff), entry.id],
        )?;
        log::warn!(
            "Outbox entry {} ({}) attempt {} failed, retrying in {}s: {}",
            entry.id,
            entry.kind,
            attempts,
            backoff,
            error
        );
    }
    Ok(())
}

fn dispatch_one(
    entry: &OutboxEntry,
    notifier: &dyn NotificationDispatcher,
    sync: &dyn IntegrationSync,
) -> Result<(), String> {
    match entry.kind.as_str() {
        KIND_NOTIFICATION => {
            let event = entry.payload["event"].as_str().unwrap_or("stage.entered");
            let audience = entry.payload["audience"].as_str().unwrap_or("");
            notifier.dispatch(event, audience, &entry.payload)
        }
        KIND_SIS_SYNC => {
            let stage = entry.payload["stage"].as_str().unwrap_or("");
            sync.sync_on_status_change(entry.application_id, stage)
        }
        other => Err(format!("Unknown outbox kind '{}'", other)),
    }
}

/// Deliver every due pending entry once. Returns (delivered, failed)
/// counts for this pass.
pub fn deliver_due(
    conn: &Connection,
    notifier: &dyn NotificationDispatcher,
    sync: &dyn IntegrationSync,
) -> Result<(usize, usize), AppError> {
    let entries = due_entries(conn, 100)?;
    let mut delivered = 0;
    let mut failed = 0;

    for entry in &entries {
        match dispatch_one(entry, notifier, sync) {
            Ok(()) => {
                mark_dispatched(conn, entry.id)?;
                delivered += 1;
            }
            Err(e) => {
                mark_attempt_failed(conn, entry, &e)?;
                failed += 1;
            }
        }
    }
    Ok((delivered, failed))
}

/// Dead-lettered entries for the operator queue.
pub fn list_failed(conn: &Connection) -> Result<Vec<OutboxEntry>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT id, application_id, kind, payload, status, attempts, next_attempt_at, \
         last_error, created_at \
         FROM side_effect_outbox WHERE status = ?1 ORDER BY id",
    )?;
    let entries = stmt
        .query_map(params![STATUS_FAILED], row_to_entry)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Put a dead-lettered entry back in the queue with a fresh attempt
/// budget.
pub fn retry_failed(conn: &Connection, id: i64) -> Result<(), AppError> {
    let changed = conn.execute(
        "UPDATE side_effect_outbox SET status = ?1, attempts = 0, last_error = NULL, \
         next_attempt_at = datetime('now') WHERE id = ?2 AND status = ?3",
        params![STATUS_PENDING, id, STATUS_FAILED],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

/// Background worker that drains the outbox on an interval.
pub fn spawn_dispatcher(
    pool: DbPool,
    notifier: Arc<dyn NotificationDispatcher>,
    sync: Arc<dyn IntegrationSync>,
    interval_secs: u64,
) {
    actix_web::rt::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            let conn = match pool.get() {
                Ok(c) => c,
                Err(e) => {
                    log::error!("Outbox dispatcher: failed to get DB connection: {}", e);
                    continue;
                }
            };
            match deliver_due(&conn, notifier.as_ref(), sync.as_ref()) {
                Ok((0, 0)) => {}
                Ok((delivered, failed)) => {
                    log::info!("Outbox pass: {} delivered, {} failed", delivered, failed);
                }
                Err(e) => log::error!("Outbox pass failed: {}", e),
            }
        }
    });
}
