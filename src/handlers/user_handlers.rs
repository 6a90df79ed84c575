use actix_session::Session;
use actix_web::{HttpResponse, web};
use serde::Deserialize;

use crate::audit;
use crate::auth::password;
use crate::auth::session::{get_user_id, require_permission};
use crate::db::DbPool;
use crate::errors::AppError;
use crate::models::{role, user};

#[derive(Debug, Deserialize)]
pub struct CreateUserForm {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    pub role_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    pub role_id: i64,
}

/// GET /api/users
pub async fn list(pool: web::Data<DbPool>, session: Session) -> Result<HttpResponse, AppError> {
    require_permission(&session, "admin.users")?;
    let conn = pool.get()?;
    let users = user::list_all(&conn)?;
    Ok(HttpResponse::Ok().json(users))
}

/// POST /api/users
pub async fn create(
    pool: web::Data<DbPool>,
    session: Session,
    form: web::Json<CreateUserForm>,
) -> Result<HttpResponse, AppError> {
    require_permission(&session, "admin.users")?;
    if form.username.trim().is_empty() || form.password.is_empty() {
        return Err(AppError::Validation("Username and password are required".to_string()));
    }

    let hash = password::hash_password(&form.password).map_err(AppError::Hash)?;
    let conn = pool.get()?;
    let id = user::create(
        &conn,
        &user::NewUser {
            username: form.username.trim().to_string(),
            password_hash: hash,
            email: form.email.clone(),
            display_name: form.display_name.clone(),
            role_id: form.role_id,
        },
    )?;

    let actor_id = get_user_id(&session).unwrap_or(0);
    let _ = audit::log(
        &conn,
        actor_id,
        "user.create",
        "user",
        id,
        serde_json::json!({ "username": form.username }),
    );

    let created = user::find_by_id(&conn, id)?.ok_or(AppError::NotFound)?;
    Ok(HttpResponse::Created().json(created))
}

/// PUT /api/users/{id}
pub async fn update(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
    form: web::Json<UpdateUserForm>,
) -> Result<HttpResponse, AppError> {
    require_permission(&session, "admin.users")?;
    let id = path.into_inner();
    let conn = pool.get()?;
    user::update(&conn, id, &form.email, &form.display_name, form.role_id)?;

    let actor_id = get_user_id(&session).unwrap_or(0);
    let _ = audit::log(&conn, actor_id, "user.update", "user", id, serde_json::json!({}));

    let updated = user::find_by_id(&conn, id)?.ok_or(AppError::NotFound)?;
    Ok(HttpResponse::Ok().json(updated))
}

/// DELETE /api/users/{id}
pub async fn delete(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    require_permission(&session, "admin.users")?;
    let id = path.into_inner();
    let actor_id = get_user_id(&session).unwrap_or(0);
    if actor_id == id {
        return Err(AppError::Validation("You cannot delete your own account".to_string()));
    }

    let conn = pool.get()?;
    user::delete(&conn, id)?;
    let _ = audit::log(&conn, actor_id, "user.delete", "user", id, serde_json::json!({}));
    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
}

/// GET /api/roles
pub async fn roles(pool: web::Data<DbPool>, session: Session) -> Result<HttpResponse, AppError> {
    require_permission(&session, "admin.users")?;
    let conn = pool.get()?;
    let roles = role::list_all(&conn)?;
    Ok(HttpResponse::Ok().json(roles))
}
