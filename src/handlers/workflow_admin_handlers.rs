use actix_session::Session;
use actix_web::{HttpResponse, web};
use serde::Deserialize;

use crate::audit;
use crate::auth::session::{get_user_id, require_permission};
use crate::db::DbPool;
use crate::errors::AppError;
use crate::models::role;
use crate::models::workflow::{self, NewStage, NewTransition};
use crate::workflow::validator;

#[derive(Debug, Deserialize)]
pub struct CreateWorkflowForm {
    pub name: String,
    pub application_type: String,
}

/// GET /api/workflows
pub async fn list(pool: web::Data<DbPool>, session: Session) -> Result<HttpResponse, AppError> {
    require_permission(&session, "workflow.manage")?;
    let conn = pool.get()?;
    let workflows = workflow::list_all(&conn)?;
    Ok(HttpResponse::Ok().json(workflows))
}

/// POST /api/workflows
pub async fn create(
    pool: web::Data<DbPool>,
    session: Session,
    form: web::Json<CreateWorkflowForm>,
) -> Result<HttpResponse, AppError> {
    require_permission(&session, "workflow.manage")?;
    if form.name.trim().is_empty() || form.application_type.trim().is_empty() {
        return Err(AppError::Validation("name and application_type are required".to_string()));
    }

    let actor_id = get_user_id(&session).unwrap_or(0);
    let conn = pool.get()?;
    let id = workflow::create(&conn, form.name.trim(), form.application_type.trim(), actor_id)?;
    let _ = audit::log(
        &conn,
        actor_id,
        "workflow.create",
        "workflow",
        id,
        serde_json::json!({ "name": form.name, "application_type": form.application_type }),
    );

    let created = workflow::find_by_id(&conn, id)?.ok_or(AppError::NotFound)?;
    Ok(HttpResponse::Created().json(created))
}

/// GET /api/workflows/{id}
///
/// The full definition graph: workflow row plus decoded stages and
/// transitions.
pub async fn get_graph(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    require_permission(&session, "workflow.manage")?;
    let conn = pool.get()?;
    let graph = workflow::load_graph(&conn, path.into_inner())?;
    Ok(HttpResponse::Ok().json(graph))
}

/// POST /api/workflows/{id}/stages
pub async fn create_stage(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
    form: web::Json<NewStage>,
) -> Result<HttpResponse, AppError> {
    require_permission(&session, "workflow.manage")?;
    if form.name.trim().is_empty() {
        return Err(AppError::Validation("Stage name is required".to_string()));
    }

    let workflow_id = path.into_inner();
    let conn = pool.get()?;
    let id = workflow::create_stage(&conn, workflow_id, &form)?;
    let _ = audit::log(
        &conn,
        get_user_id(&session).unwrap_or(0),
        "workflow.stage.create",
        "workflow_stage",
        id,
        serde_json::json!({ "workflow_id": workflow_id, "name": form.name }),
    );
    Ok(HttpResponse::Created().json(serde_json::json!({ "id": id })))
}

/// PUT /api/workflows/{id}/stages/{stage_id}
pub async fn update_stage(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<(i64, i64)>,
    form: web::Json<NewStage>,
) -> Result<HttpResponse, AppError> {
    require_permission(&session, "workflow.manage")?;
    let (workflow_id, stage_id) = path.into_inner();
    let conn = pool.get()?;
    workflow::update_stage(&conn, workflow_id, stage_id, &form)?;
    let _ = audit::log(
        &conn,
        get_user_id(&session).unwrap_or(0),
        "workflow.stage.update",
        "workflow_stage",
        stage_id,
        serde_json::json!({ "workflow_id": workflow_id }),
    );
    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
}

/// DELETE /api/workflows/{id}/stages/{stage_id}
pub async fn delete_stage(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse, AppError> {
    require_permission(&session, "workflow.manage")?;
    let (workflow_id, stage_id) = path.into_inner();
    let conn = pool.get()?;
    workflow::delete_stage(&conn, workflow_id, stage_id)?;
    let _ = audit::log(
        &conn,
        get_user_id(&session).unwrap_or(0),
        "workflow.stage.delete",
        "workflow_stage",
        stage_id,
        serde_json::json!({ "workflow_id": workflow_id }),
    );
    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
}

/// POST /api/workflows/{id}/transitions
pub async fn create_transition(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
    form: web::Json<NewTransition>,
) -> Result<HttpResponse, AppError> {
    require_permission(&session, "workflow.manage")?;
    if form.name.trim().is_empty() {
        return Err(AppError::Validation("Transition name is required".to_string()));
    }

    let workflow_id = path.into_inner();
    let conn = pool.get()?;
    let id = workflow::create_transition(&conn, workflow_id, &form)?;
    let _ = audit::log(
        &conn,
        get_user_id(&session).unwrap_or(0),
        "workflow.transition.create",
        "workflow_transition",
        id,
        serde_json::json!({ "workflow_id": workflow_id, "name": form.name }),
    );
    Ok(HttpResponse::Created().json(serde_json::json!({ "id": id })))
}

/// PUT /api/workflows/{id}/transitions/{transition_id}
pub async fn update_transition(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<(i64, i64)>,
    form: web::Json<NewTransition>,
) -> Result<HttpResponse, AppError> {
    require_permission(&session, "workflow.manage")?;
    let (workflow_id, transition_id) = path.into_inner();
    let conn = pool.get()?;
    workflow::update_transition(&conn, workflow_id, transition_id, &form)?;
    let _ = audit::log(
        &conn,
        get_user_id(&session).unwrap_or(0),
        "workflow.transition.update",
        "workflow_transition",
        transition_id,
        serde_json::json!({ "workflow_id": workflow_id }),
    );
    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
}

/// DELETE /api/workflows/{id}/transitions/{transition_id}
pub async fn delete_transition(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse, AppError> {
    require_permission(&session, "workflow.manage")?;
    let (workflow_id, transition_id) = path.into_inner();
    let conn = pool.get()?;
    workflow::delete_transition(&conn, workflow_id, transition_id)?;
    let _ = audit::log(
        &conn,
        get_user_id(&session).unwrap_or(0),
        "workflow.transition.delete",
        "workflow_transition",
        transition_id,
        serde_json::json!({ "workflow_id": workflow_id }),
    );
    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
}

/// GET /api/workflows/{id}/validate
///
/// Dry-run structural validation: the full problem list without any
/// state change. An empty list means the workflow is activatable.
pub async fn validate(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    require_permission(&session, "workflow.manage")?;
    let conn = pool.get()?;
    let graph = workflow::load_graph(&conn, path.into_inner())?;
    let known_permissions = role::permission_catalog(&conn)?;
    let problems = validator::validate(&graph, &known_permissions);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "valid": problems.is_empty(),
        "problems": problems,
    })))
}

/// POST /api/workflows/{id}/activate
pub async fn activate(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    require_permission(&session, "workflow.manage")?;
    let workflow_id = path.into_inner();
    let mut conn = pool.get()?;
    workflow::activate(&mut conn, workflow_id)?;
    let _ = audit::log(
        &conn,
        get_user_id(&session).unwrap_or(0),
        "workflow.activate",
        "workflow",
        workflow_id,
        serde_json::json!({}),
    );

    let activated = workflow::find_by_id(&conn, workflow_id)?.ok_or(AppError::NotFound)?;
    Ok(HttpResponse::Ok().json(activated))
}

/// POST /api/workflows/{id}/deactivate
pub async fn deactivate(
    pool: web::Data<DbPool>,
    session: Session,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    require_permission(&session, "workflow.manage")?;
    let workflow_id = path.into_inner();
    let conn = pool.get()?;
    workflow::deactivate(&conn, workflow_id)?;
    let _ = audit::log(
        &conn,
        get_user_id(&session).unwrap_or(0),
        "workflow.deactivate",
        "workflow",
        workflow_id,
        serde_json::json!({}),
    );
    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
}
