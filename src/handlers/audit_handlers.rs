use actix_session::Session;
use actix_web::{HttpResponse, web};
use serde::Deserialize;

use crate::audit;
use crate::auth::session::require_permission;
use crate::db::DbPool;
use crate::errors::AppError;

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// GET /api/audit
pub async fn list(
    pool: web::Data<DbPool>,
    session: Session,
    query: web::Query<AuditQuery>,
) -> Result<HttpResponse, AppError> {
    require_permission(&session, "audit.view")?;
    let conn = pool.get()?;
    let entries = audit::list_recent(&conn, query.limit.clamp(1, 1000))?;
    Ok(HttpResponse::Ok().json(entries))
}
