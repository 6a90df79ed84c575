use actix_session::Session;
use actix_web::{HttpResponse, web};
use serde::Deserialize;

use crate::auth::password;
use crate::auth::session::{Permissions, get_user_id, get_username};
use crate::db::DbPool;
use crate::errors::AppError;
use crate::models::user;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// POST /api/auth/login
pub async fn login(
    pool: web::Data<DbPool>,
    session: Session,
    form: web::Json<LoginForm>,
) -> Result<HttpResponse, AppError> {
    let conn = pool.get()?;

    let hash = user::password_hash(&conn, &form.username)?;
    let valid = match &hash {
        Some(hash) => password::verify_password(&form.password, hash).unwrap_or(false),
        None => false,
    };
    if !valid {
        log::warn!("Failed login attempt for '{}'", form.username);
        return Err(AppError::Session("Invalid username or password".to_string()));
    }

    let account = user::find_by_username(&conn, &form.username)?.ok_or(AppError::NotFound)?;
    let permissions = Permissions(user::permissions_for_user(&conn, account.id)?);

    session.renew();
    session
        .insert("user_id", account.id)
        .map_err(|e| AppError::Session(e.to_string()))?;
    session
        .insert("username", account.username.clone())
        .map_err(|e| AppError::Session(e.to_string()))?;
    session
        .insert("permissions", permissions.to_csv())
        .map_err(|e| AppError::Session(e.to_string()))?;

    let _ = crate::audit::log(
        &conn,
        account.id,
        "auth.login",
        "user",
        account.id,
        serde_json::json!({ "username": account.username }),
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "id": account.id,
        "username": account.username,
        "display_name": account.display_name,
        "role": account.role_name,
        "permissions": permissions.0,
    })))
}

/// POST /api/auth/logout
pub async fn logout(session: Session) -> Result<HttpResponse, AppError> {
    session.purge();
    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
}

/// GET /api/auth/me
pub async fn me(pool: web::Data<DbPool>, session: Session) -> Result<HttpResponse, AppError> {
    let user_id =
        get_user_id(&session).ok_or_else(|| AppError::Session("Not logged in".to_string()))?;
    let username = get_username(&session).map_err(AppError::Session)?;
    let conn = pool.get()?;
    let permissions = user::permissions_for_user(&conn, user_id)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "id": user_id,
        "username": username,
        "permissions": permissions,
    })))
}
