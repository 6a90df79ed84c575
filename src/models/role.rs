use std::collections::HashSet;

use rusqlite::{Connection, params};
use serde::Serialize;

use crate::errors::AppError;

/// Permission codes the application itself hands out. Workflow transition
/// requirements must resolve against this catalog (plus anything granted
/// to a role) at validation time.
pub const BUILTIN_PERMISSIONS: &[&str] = &[
    "admin.users",
    "workflow.manage",
    "application.view",
    "application.submit",
    "document.verify",
    "payment.process",
    "message.send",
    "review.start",
    "review.decide",
    "audit.view",
    "outbox.manage",
];

#[derive(Debug, Clone, Serialize)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub label: String,
    pub permissions: Vec<String>,
}

pub fn create(
    conn: &Connection,
    name: &str,
    label: &str,
    permissions: &[&str],
) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO roles (name, label) VALUES (?1, ?2)",
        params![name, label],
    )?;
    let role_id = conn.last_insert_rowid();
    for permission in permissions {
        conn.execute(
            "INSERT OR IGNORE INTO role_permissions (role_id, permission) VALUES (?1, ?2)",
            params![role_id, permission],
        )?;
    }
    Ok(role_id)
}

pub fn find_by_name(conn: &Connection, name: &str) -> Result<Option<i64>, AppError> {
    use rusqlite::OptionalExtension;
    let id = conn
        .query_row("SELECT id FROM roles WHERE name = ?1", params![name], |row| row.get(0))
        .optional()?;
    Ok(id)
}

pub fn list_all(conn: &Connection) -> Result<Vec<Role>, AppError> {
    let mut stmt = conn.prepare("SELECT id, name, label FROM roles ORDER BY id")?;
    let mut roles = stmt
        .query_map([], |row| {
            Ok(Role {
                id: row.get(0)?,
                name: row.get(1)?,
                label: row.get(2)?,
                permissions: Vec::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for role in &mut roles {
        role.permissions = permissions_for_role(conn, role.id)?;
    }
    Ok(roles)
}

pub fn permissions_for_role(conn: &Connection, role_id: i64) -> Result<Vec<String>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT permission FROM role_permissions WHERE role_id = ?1 ORDER BY permission",
    )?;
    let permissions = stmt
        .query_map(params![role_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(permissions)
}

/// All resolvable permission codes: the built-in catalog plus anything
/// already granted to a role.
pub fn permission_catalog(conn: &Connection) -> Result<HashSet<String>, AppError> {
    let mut catalog: HashSet<String> =
        BUILTIN_PERMISSIONS.iter().map(|s| s.to_string()).collect();
    let mut stmt = conn.prepare("SELECT DISTINCT permission FROM role_permissions")?;
    let granted = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    catalog.extend(granted);
    Ok(catalog)
}
