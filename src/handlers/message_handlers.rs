use actix_session::Session;
use actix_web::{HttpResponse, web};
use serde::Deserialize;

use crate::auth::session::actor_from_session;
use crate::db::DbPool;
use crate::errors::AppError;
use crate::models::{application, message};

#[derive(Debug, Deserialize)]
pub struct PostMessageForm {
    pub body: String,
}

fn check_thread_access(
    conn: &rusqlite::Connection,
    application_id: i64,
    actor: &crate::auth::session::Actor,
) -> Result<(), AppError> {
    let app = application::find_by_id(conn, application_id)?.ok_or(AppError::NotFound)?;
    if app.applicant_user_id != actor.user_id && !actor.permissions.has("application.view") {
        return Err(AppError::PermissionDenied("application.view".to_string()));
    }
    Ok(())
}

/// GET /api/applications/{id}/messages
pub async fn list(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let actor = actor_from_session(&session)?;
    let application_id = path.into_inner();
    let conn = pool.get()?;
    check_thread_access(&conn, application_id, &actor)?;
    let messages = message::list_for_application(&conn, application_id)?;
    Ok(HttpResponse::Ok().json(messages))
}

/// POST /api/applications/{id}/messages
///
/// Staff posting into a thread need `message.send`; applicants can
/// always post on their own application.
pub async fn post(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
    form: web::Json<PostMessageForm>,
) -> Result<HttpResponse, AppError> {
    let actor = actor_from_session(&session)?;
    if form.body.trim().is_empty() {
        return Err(AppError::Validation("Message body cannot be empty".to_string()));
    }

    let application_id = path.into_inner();
    let conn = pool.get()?;
    let app = application::find_by_id(&conn, application_id)?.ok_or(AppError::NotFound)?;
    if app.applicant_user_id != actor.user_id && !actor.permissions.has("message.send") {
        return Err(AppError::PermissionDenied("message.send".to_string()));
    }

    message::create(&conn, application_id, actor.user_id, form.body.trim())?;
    let messages = message::list_for_application(&conn, application_id)?;
    Ok(HttpResponse::Created().json(messages))
}

/// POST /api/applications/{id}/messages/read
pub async fn mark_read(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let actor = actor_from_session(&session)?;
    let application_id = path.into_inner();
    let conn = pool.get()?;
    check_thread_access(&conn, application_id, &actor)?;
    let marked = message::mark_read(&conn, application_id, actor.user_id)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "marked": marked })))
}
