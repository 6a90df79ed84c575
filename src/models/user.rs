use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::role;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub role_id: i64,
    pub role_name: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub display_name: String,
    pub role_id: i64,
}

const SELECT_USER: &str = "\
    SELECT u.id, u.username, u.email, u.display_name, \
           COALESCE(u.role_id, 0) AS role_id, \
           COALESCE(r.name, '') AS role_name, \
           u.created_at, u.updated_at \
    FROM users u \
    LEFT JOIN roles r ON u.role_id = r.id";

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        username: row.get("username")?,
        email: row.get("email")?,
        display_name: row.get("display_name")?,
        role_id: row.get("role_id")?,
        role_name: row.get("role_name")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn create(conn: &Connection, user: &NewUser) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO users (username, password_hash, email, display_name, role_id) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user.username, user.password_hash, user.email, user.display_name, user.role_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<User>, AppError> {
    let sql = format!("{SELECT_USER} WHERE u.id = ?1");
    let user = conn.query_row(&sql, params![id], row_to_user).optional()?;
    Ok(user)
}

pub fn find_by_username(conn: &Connection, username: &str) -> Result<Option<User>, AppError> {
    let sql = format!("{SELECT_USER} WHERE u.username = ?1");
    let user = conn
        .query_row(&sql, params![username], row_to_user)
        .optional()?;
    Ok(user)
}

pub fn password_hash(conn: &Connection, username: &str) -> Result<Option<String>, AppError> {
    let hash = conn
        .query_row(
            "SELECT password_hash FROM users WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )
        .optional()?;
    Ok(hash)
}

pub fn list_all(conn: &Connection) -> Result<Vec<User>, AppError> {
    let sql = format!("{SELECT_USER} ORDER BY u.id");
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map([], row_to_user)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

pub fn update(
    conn: &Connection,
    id: i64,
    email: &str,
    display_name: &str,
    role_id: i64,
) -> Result<(), AppError> {
    let changed = conn.execute(
        "UPDATE users SET email = ?1, display_name = ?2, role_id = ?3, \
         updated_at = datetime('now') WHERE id = ?4",
        params![email, display_name, role_id, id],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

pub fn delete(conn: &Connection, id: i64) -> Result<(), AppError> {
    let changed = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

/// Permission codes for a user via their role.
pub fn permissions_for_user(conn: &Connection, user_id: i64) -> Result<Vec<String>, AppError> {
    let role_id: Option<i64> = conn
        .query_row("SELECT role_id FROM users WHERE id = ?1", params![user_id], |row| row.get(0))
        .optional()?
        .flatten();
    match role_id {
        Some(role_id) => role::permissions_for_role(conn, role_id),
        None => Ok(Vec::new()),
    }
}
