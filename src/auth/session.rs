use actix_session::Session;

use crate::errors::AppError;

/// Wrapper around permission codes. The workflow engine consumes this as its
/// permission-check capability and never looks at roles directly.
#[derive(Debug, Clone, Default)]
pub struct Permissions(pub Vec<String>);

impl Permissions {
    pub fn has(&self, code: &str) -> bool {
        self.0.iter().any(|p| p == code)
    }

    pub fn from_csv(csv: &str) -> Self {
        let codes = csv
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        Permissions(codes)
    }

    pub fn to_csv(&self) -> String {
        self.0.join(",")
    }
}

/// Who is driving an engine operation. The system actor is used by the
/// automatic transition scanner and bypasses permission checks.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: i64,
    pub permissions: Permissions,
    pub is_system: bool,
}

impl Actor {
    pub fn user(user_id: i64, permissions: Permissions) -> Self {
        Actor { user_id, permissions, is_system: false }
    }

    pub fn system() -> Self {
        Actor { user_id: 0, permissions: Permissions::default(), is_system: true }
    }
}

pub fn get_user_id(session: &Session) -> Option<i64> {
    session.get::<i64>("user_id").unwrap_or(None)
}

pub fn get_username(session: &Session) -> Result<String, String> {
    match session.get::<String>("username") {
        Ok(Some(username)) => Ok(username),
        Ok(None) => Err("No username in session".to_string()),
        Err(e) => Err(format!("Session error: {}", e)),
    }
}

pub fn get_permissions(session: &Session) -> Result<Permissions, String> {
    match session.get::<String>("permissions") {
        Ok(Some(csv)) => Ok(Permissions::from_csv(&csv)),
        Ok(None) => Err("No permissions in session".to_string()),
        Err(e) => Err(format!("Session error: {}", e)),
    }
}

/// Build the acting user from the session, for handing to the engine.
pub fn actor_from_session(session: &Session) -> Result<Actor, AppError> {
    let user_id = get_user_id(session)
        .ok_or_else(|| AppError::Session("User not logged in".to_string()))?;
    let permissions = get_permissions(session).map_err(AppError::Session)?;
    Ok(Actor::user(user_id, permissions))
}

/// Check permission; returns Err(AppError) if denied.
pub fn require_permission(session: &Session, code: &str) -> Result<(), AppError> {
    let permissions = get_permissions(session)
        .map_err(|e| AppError::Session(format!("Failed to get permissions: {}", e)))?;

    if permissions.has(code) {
        Ok(())
    } else {
        Err(AppError::PermissionDenied(code.to_string()))
    }
}
