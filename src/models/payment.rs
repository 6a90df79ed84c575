use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::errors::AppError;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";

#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: i64,
    pub application_id: i64,
    pub amount_cents: i64,
    pub currency: String,
    pub purpose: String,
    pub status: String,
    pub gateway_reference: String,
    pub created_at: String,
    pub updated_at: String,
}

fn row_to_payment(row: &rusqlite::Row) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get("id")?,
        application_id: row.get("application_id")?,
        amount_cents: row.get("amount_cents")?,
        currency: row.get("currency")?,
        purpose: row.get("purpose")?,
        status: row.get("status")?,
        gateway_reference: row.get("gateway_reference")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const SELECT_PAYMENT: &str = "\
    SELECT id, application_id, amount_cents, currency, purpose, status, \
           gateway_reference, created_at, updated_at \
    FROM payments";

pub fn create(
    conn: &Connection,
    application_id: i64,
    amount_cents: i64,
    currency: &str,
    purpose: &str,
) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO payments (application_id, amount_cents, currency, purpose) \
         VALUES (?1, ?2, ?3, ?4)",
        params![application_id, amount_cents, currency, purpose],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Payment>, AppError> {
    let sql = format!("{SELECT_PAYMENT} WHERE id = ?1");
    let payment = conn
        .query_row(&sql, params![id], row_to_payment)
        .optional()?;
    Ok(payment)
}

pub fn list_for_application(
    conn: &Connection,
    application_id: i64,
) -> Result<Vec<Payment>, AppError> {
    let sql = format!("{SELECT_PAYMENT} WHERE application_id = ?1 ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let payments = stmt
        .query_map(params![application_id], row_to_payment)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(payments)
}

/// Record the gateway outcome for a payment.
pub fn set_outcome(
    conn: &Connection,
    id: i64,
    status: &str,
    gateway_reference: &str,
) -> Result<(), AppError> {
    let changed = conn.execute(
        "UPDATE payments SET status = ?1, gateway_reference = ?2, \
         updated_at = datetime('now') WHERE id = ?3",
        params![status, gateway_reference, id],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

/// True if the application has at least one completed payment.
pub fn has_completed(conn: &Connection, application_id: i64) -> Result<bool, AppError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM payments WHERE application_id = ?1 AND status = ?2",
        params![application_id, STATUS_COMPLETED],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
