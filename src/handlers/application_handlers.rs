use actix_session::Session;
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::Value;

use crate::audit;
use crate::auth::session::{Actor, actor_from_session};
use crate::db::DbPool;
use crate::errors::AppError;
use crate::models::application::{self, Application};
use crate::workflow::engine;

#[derive(Debug, Deserialize)]
pub struct CreateApplicationForm {
    pub application_type: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDataForm {
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct TransitionForm {
    pub transition_id: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Applicants may only see their own applications; staff need
/// `application.view`.
fn check_access(app: &Application, actor: &Actor) -> Result<(), AppError> {
    if app.applicant_user_id == actor.user_id || actor.permissions.has("application.view") {
        Ok(())
    } else {
        Err(AppError::PermissionDenied("application.view".to_string()))
    }
}

fn load_for_actor(
    conn: &rusqlite::Connection,
    id: i64,
    actor: &Actor,
) -> Result<Application, AppError> {
    let app = application::find_by_id(conn, id)?.ok_or(AppError::NotFound)?;
    check_access(&app, actor)?;
    Ok(app)
}

/// POST /api/applications
pub async fn create(
    pool: web::Data<DbPool>,
    session: Session,
    form: web::Json<CreateApplicationForm>,
) -> Result<HttpResponse, AppError> {
    let actor = actor_from_session(&session)?;
    if form.application_type.trim().is_empty() {
        return Err(AppError::Validation("application_type is required".to_string()));
    }
    let data = match &form.data {
        Value::Null => Value::Object(serde_json::Map::new()),
        Value::Object(_) => form.data.clone(),
        _ => return Err(AppError::Validation("data must be a JSON object".to_string())),
    };

    let conn = pool.get()?;
    let id = application::create(&conn, actor.user_id, form.application_type.trim(), &data)?;
    let _ = audit::log(
        &conn,
        actor.user_id,
        "application.create",
        "application",
        id,
        serde_json::json!({ "application_type": form.application_type }),
    );

    let app = application::find_by_id(&conn, id)?.ok_or(AppError::NotFound)?;
    Ok(HttpResponse::Created().json(app))
}

/// GET /api/applications
///
/// Staff with `application.view` see everything; applicants see only
/// their own.
pub async fn list(pool: web::Data<DbPool>, session: Session) -> Result<HttpResponse, AppError> {
    let actor = actor_from_session(&session)?;
    let conn = pool.get()?;
    let applications = if actor.permissions.has("application.view") {
        application::list_all(&conn)?
    } else {
        application::list_for_applicant(&conn, actor.user_id)?
    };
    Ok(HttpResponse::Ok().json(applications))
}

/// GET /api/applications/{id}
pub async fn get(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let actor = actor_from_session(&session)?;
    let conn = pool.get()?;
    let app = load_for_actor(&conn, path.into_inner(), &actor)?;
    Ok(HttpResponse::Ok().json(app))
}

/// PUT /api/applications/{id}/data
pub async fn update_data(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
    form: web::Json<UpdateDataForm>,
) -> Result<HttpResponse, AppError> {
    let actor = actor_from_session(&session)?;
    if !form.data.is_object() {
        return Err(AppError::Validation("data must be a JSON object".to_string()));
    }

    let conn = pool.get()?;
    let app = load_for_actor(&conn, path.into_inner(), &actor)?;
    if app.is_terminal {
        return Err(AppError::Validation(format!(
            "Application {} is at a terminal stage and can no longer be edited",
            app.id
        )));
    }
    application::update_data(&conn, app.id, &form.data)?;
    let _ = audit::log(
        &conn,
        actor.user_id,
        "application.update_data",
        "application",
        app.id,
        serde_json::json!({}),
    );

    let updated = application::find_by_id(&conn, app.id)?.ok_or(AppError::NotFound)?;
    Ok(HttpResponse::Ok().json(updated))
}

/// POST /api/applications/{id}/submit
///
/// Places the application at the entry stage of the active workflow for
/// its type. Re-submitting an already-initialized application is a 409.
pub async fn submit(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let actor = actor_from_session(&session)?;
    let id = path.into_inner();
    let mut conn = pool.get()?;
    load_for_actor(&conn, id, &actor)?;

    let record = engine::initialize(&mut conn, id, &actor)?;
    let _ = audit::log(
        &conn,
        actor.user_id,
        "application.submit",
        "application",
        id,
        serde_json::json!({ "status": record.status }),
    );
    Ok(HttpResponse::Ok().json(record))
}

/// GET /api/applications/{id}/history
pub async fn history(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let actor = actor_from_session(&session)?;
    let conn = pool.get()?;
    let app = load_for_actor(&conn, path.into_inner(), &actor)?;
    let records = engine::get_status_history(&conn, app.id)?;
    Ok(HttpResponse::Ok().json(records))
}

/// GET /api/applications/{id}/completeness
pub async fn completeness(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let actor = actor_from_session(&session)?;
    let conn = pool.get()?;
    let app = load_for_actor(&conn, path.into_inner(), &actor)?;
    let report = engine::check_completeness(&conn, app.id)?;
    Ok(HttpResponse::Ok().json(report))
}

/// GET /api/applications/{id}/transitions
pub async fn transitions(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let actor = actor_from_session(&session)?;
    let conn = pool.get()?;
    let app = load_for_actor(&conn, path.into_inner(), &actor)?;
    let summaries = engine::available_transitions(&conn, app.id, &actor)?;
    Ok(HttpResponse::Ok().json(summaries))
}

/// POST /api/applications/{id}/transitions
pub async fn execute_transition(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
    form: web::Json<TransitionForm>,
) -> Result<HttpResponse, AppError> {
    let actor = actor_from_session(&session)?;
    let id = path.into_inner();
    let mut conn = pool.get()?;
    load_for_actor(&conn, id, &actor)?;

    let record = engine::execute_transition(
        &mut conn,
        id,
        form.transition_id,
        &actor,
        form.notes.as_deref(),
    )?;
    let _ = audit::log(
        &conn,
        actor.user_id,
        "application.transition",
        "application",
        id,
        serde_json::json!({ "transition_id": form.transition_id, "status": record.status }),
    );
    Ok(HttpResponse::Ok().json(record))
}
