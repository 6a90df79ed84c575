use actix_session::Session;
use actix_web::{HttpResponse, web};

use crate::audit;
use crate::auth::session::{get_user_id, require_permission};
use crate::db::DbPool;
use crate::errors::AppError;
use crate::workflow::outbox;

/// GET /api/outbox/failed
pub async fn list_failed(
    pool: web::Data<DbPool>,
    session: Session,
) -> Result<HttpResponse, AppError> {
    require_permission(&session, "outbox.manage")?;
    let conn = pool.get()?;
    let entries = outbox::list_failed(&conn)?;
    Ok(HttpResponse::Ok().json(entries))
}

/// POST /api/outbox/{id}/retry
pub async fn retry(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    require_permission(&session, "outbox.manage")?;
    let id = path.into_inner();
    let conn = pool.get()?;
    outbox::retry_failed(&conn, id)?;
    let _ = audit::log(
        &conn,
        get_user_id(&session).unwrap_or(0),
        "outbox.retry",
        "outbox_entry",
        id,
        serde_json::json!({}),
    );
    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
}
