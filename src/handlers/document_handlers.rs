use actix_session::Session;
use actix_web::{HttpResponse, web};
use serde::Deserialize;

use crate::audit;
use crate::auth::session::{actor_from_session, require_permission};
use crate::db::DbPool;
use crate::errors::AppError;
use crate::handlers::Integrations;
use crate::models::{application, document};

#[derive(Debug, Deserialize)]
pub struct UploadForm {
    pub document_type: String,
    pub file_name: String,
}

fn load_application_for_actor(
    conn: &rusqlite::Connection,
    application_id: i64,
    actor: &crate::auth::session::Actor,
) -> Result<application::Application, AppError> {
    let app = application::find_by_id(conn, application_id)?.ok_or(AppError::NotFound)?;
    if app.applicant_user_id != actor.user_id && !actor.permissions.has("application.view") {
        return Err(AppError::PermissionDenied("application.view".to_string()));
    }
    Ok(app)
}

/// POST /api/applications/{id}/documents
///
/// Records document metadata; the upload itself lives in object storage
/// fronted elsewhere. New documents start `pending`.
pub async fn upload(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
    form: web::Json<UploadForm>,
) -> Result<HttpResponse, AppError> {
    let actor = actor_from_session(&session)?;
    if form.document_type.trim().is_empty() || form.file_name.trim().is_empty() {
        return Err(AppError::Validation("document_type and file_name are required".to_string()));
    }

    let conn = pool.get()?;
    let app = load_application_for_actor(&conn, path.into_inner(), &actor)?;
    let id = document::create(
        &conn,
        app.id,
        form.document_type.trim(),
        form.file_name.trim(),
        actor.user_id,
    )?;
    let _ = audit::log(
        &conn,
        actor.user_id,
        "document.upload",
        "document",
        id,
        serde_json::json!({ "application_id": app.id, "document_type": form.document_type }),
    );

    let created = document::find_by_id(&conn, id)?.ok_or(AppError::NotFound)?;
    Ok(HttpResponse::Created().json(created))
}

/// GET /api/applications/{id}/documents
pub async fn list(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let actor = actor_from_session(&session)?;
    let conn = pool.get()?;
    let app = load_application_for_actor(&conn, path.into_inner(), &actor)?;
    let documents = document::list_for_application(&conn, app.id)?;
    Ok(HttpResponse::Ok().json(documents))
}

/// POST /api/documents/{id}/verify
///
/// Runs the document analyzer and records its outcome. The transition
/// scanner picks up the resulting `documents_verified` fact on its next
/// pass.
pub async fn verify(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
    integrations: web::Data<Integrations>,
) -> Result<HttpResponse, AppError> {
    require_permission(&session, "document.verify")?;
    let actor = actor_from_session(&session)?;
    let id = path.into_inner();

    let conn = pool.get()?;
    let doc = document::find_by_id(&conn, id)?.ok_or(AppError::NotFound)?;

    let outcome = integrations
        .analyzer
        .verify(&doc.document_type, &doc.file_name)
        .map_err(AppError::Validation)?;
    document::set_verification(&conn, doc.id, &outcome.status, outcome.confidence)?;

    let _ = audit::log(
        &conn,
        actor.user_id,
        "document.verify",
        "document",
        doc.id,
        serde_json::json!({ "status": outcome.status, "confidence": outcome.confidence }),
    );

    let updated = document::find_by_id(&conn, doc.id)?.ok_or(AppError::NotFound)?;
    Ok(HttpResponse::Ok().json(updated))
}
