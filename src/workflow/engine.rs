//! The workflow engine: drives an application through the stage graph of
//! its admissions workflow.
//!
//! Every application is located at exactly one stage (or uninitialized
//! before `initialize`, or terminal once it reaches a stage with no
//! outgoing transitions). All stage movement goes through
//! `execute_transition`, which runs as one IMMEDIATE transaction and
//! guards the read-check-write sequence with the application's
//! `status_version`: of two competing transitions, exactly one commits
//! and the loser gets `InvalidTransition`.
//!
//! Side effects (notifications, SIS sync) are written as outbox intents
//! inside the same transaction and dispatched after commit by the outbox
//! worker; their failures can never roll back a committed transition.

use rusqlite::{Connection, TransactionBehavior, params};
use serde_json::{Value, json};

use crate::auth::session::Actor;
use crate::errors::AppError;
use crate::models::application::{self, Application, StatusRecord};
use crate::models::workflow::{self, TransitionSummary, WorkflowGraph, WorkflowTransition};
use crate::models::{document, payment};
use crate::workflow::{conditions, outbox};

#[derive(Debug, Clone, serde::Serialize)]
pub struct Completeness {
    pub is_complete: bool,
    pub missing_requirements: Vec<String>,
}

fn get_application(conn: &Connection, application_id: i64) -> Result<Application, AppError> {
    application::find_by_id(conn, application_id)?.ok_or(AppError::NotFound)
}

fn current_stage_id(app: &Application) -> Result<i64, AppError> {
    app.current_stage_id.ok_or_else(|| {
        AppError::Validation(format!("Application {} has no workflow state", app.id))
    })
}

/// Load the graph that owns the given stage. In-flight applications stay
/// on the workflow they started in even after a newer one is activated
/// for the type, so resolution goes stage -> workflow, not via is_active.
fn graph_for_stage(conn: &Connection, stage_id: i64) -> Result<WorkflowGraph, AppError> {
    let workflow_id: i64 = conn.query_row(
        "SELECT workflow_id FROM workflow_stages WHERE id = ?1",
        params![stage_id],
        |row| row.get(0),
    )?;
    workflow::load_graph(conn, workflow_id)
}

/// Build the data snapshot conditions evaluate against: the application's
/// data bag fields at the root, the same bag under `application_data`,
/// and derived facts about documents and payments.
pub fn condition_context(conn: &Connection, app: &Application) -> Result<Value, AppError> {
    let mut ctx = match &app.data {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };

    let documents_verified = match app.current_stage_id {
        Some(stage_id) => {
            let graph = graph_for_stage(conn, stage_id)?;
            let stage = graph.stage(stage_id).ok_or(AppError::NotFound)?;
            let verified = document::verified_types(conn, app.id)?;
            stage
                .required_documents
                .iter()
                .all(|doc| verified.iter().any(|v| v == doc))
        }
        None => false,
    };

    ctx.insert(
        "application".to_string(),
        json!({ "id": app.id, "application_type": app.application_type }),
    );
    ctx.insert("application_data".to_string(), app.data.clone());
    ctx.insert("documents_verified".to_string(), Value::Bool(documents_verified));
    ctx.insert(
        "payment_completed".to_string(),
        Value::Bool(payment::has_completed(conn, app.id)?),
    );

    Ok(Value::Object(ctx))
}

/// Place an application at the entry stage of the active workflow for its
/// type, writing the first status record and queueing stage-entry
/// notifications. Re-initializing fails with `AlreadyInitialized`.
pub fn initialize(
    conn: &mut Connection,
    application_id: i64,
    actor: &Actor,
) -> Result<StatusRecord, AppError> {
    let app = get_application(conn, application_id)?;
    if app.current_status_id.is_some() {
        return Err(AppError::AlreadyInitialized(app.id));
    }

    let active = workflow::get_active(conn, &app.application_type)?
        .ok_or_else(|| AppError::NoActiveWorkflow(app.application_type.clone()))?;
    let graph = workflow::load_graph(conn, active.id)?;

    // The validator guarantees a single entry stage for any activated
    // workflow; anything else here means the definitions were edited out
    // of band.
    let entries = graph.entry_candidates();
    let entry = match entries.as_slice() {
        [single] => *single,
        _ => {
            return Err(AppError::Validation(format!(
                "Workflow {} does not have exactly one entry stage",
                graph.workflow.id
            )));
        }
    };

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    tx.execute(
        "INSERT INTO application_statuses \
         (application_id, workflow_stage_id, status, notes, created_by_user_id) \
         VALUES (?1, ?2, ?3, '', ?4)",
        params![app.id, entry.id, entry.name, actor.user_id],
    )?;
    let status_id = tx.last_insert_rowid();

    let changed = tx.execute(
        "UPDATE applications SET current_stage_id = ?1, current_status_id = ?2, \
         status_version = status_version + 1, is_terminal = ?3, updated_at = datetime('now') \
         WHERE id = ?4 AND status_version = ?5",
        params![
            entry.id,
            status_id,
            graph.is_terminal(entry.id) as i64,
            app.id,
            app.status_version
        ],
    )?;
    if changed == 0 {
        // Lost a race against a concurrent initialize.
        return Err(AppError::AlreadyInitialized(app.id));
    }

    outbox::enqueue_stage_entry(&tx, app.id, entry)?;
    tx.commit()?;

    log::info!(
        "Application {} initialized into workflow {} at stage '{}'",
        app.id,
        graph.workflow.id,
        entry.name
    );
    application::find_status_by_id(conn, status_id)?.ok_or(AppError::NotFound)
}

/// Transitions leaving the application's current stage. Manual ones are
/// filtered to those the actor may trigger; automatic ones are included
/// informationally (the scanner fires them, not the actor).
pub fn available_transitions(
    conn: &Connection,
    application_id: i64,
    actor: &Actor,
) -> Result<Vec<TransitionSummary>, AppError> {
    let app = get_application(conn, application_id)?;
    let stage_id = current_stage_id(&app)?;
    let graph = graph_for_stage(conn, stage_id)?;

    let mut summaries = Vec::new();
    for t in graph.outgoing(stage_id) {
        if !t.is_automatic && !actor.is_system {
            let allowed = t.required_permissions.iter().all(|p| actor.permissions.has(p));
            if !allowed {
                continue;
            }
        }
        let target_name = graph
            .stage(t.target_stage_id)
            .map(|s| s.name.clone())
            .unwrap_or_default();
        summaries.push(TransitionSummary {
            id: t.id,
            name: t.name.clone(),
            target_stage_id: t.target_stage_id,
            target_stage_name: target_name,
            is_automatic: t.is_automatic,
            is_revision: t.is_revision,
            required_permissions: t.required_permissions.clone(),
        });
    }
    Ok(summaries)
}

/// Find the automatic transition that should fire for an application, if
/// any. Candidates are evaluated in ascending transition id order (the
/// documented tie-break) and at most one is returned per pass.
pub fn evaluate_automatic(
    conn: &Connection,
    application_id: i64,
) -> Result<Option<WorkflowTransition>, AppError> {
    let app = get_application(conn, application_id)?;
    let Some(stage_id) = app.current_stage_id else {
        return Ok(None);
    };
    if app.is_terminal {
        return Ok(None);
    }

    let graph = graph_for_stage(conn, stage_id)?;
    let ctx = condition_context(conn, &app)?;

    for t in graph.outgoing(stage_id) {
        if t.is_automatic && conditions::evaluate_all(&t.conditions, &ctx) {
            return Ok(Some(t.clone()));
        }
    }
    Ok(None)
}

/// Execute a transition for an application. Validates the source stage,
/// the actor's permissions (manual transitions only; the system actor is
/// exempt) and the transition conditions, then atomically appends the
/// status record, advances the stage pointer and queues side effects.
pub fn execute_transition(
    conn: &mut Connection,
    application_id: i64,
    transition_id: i64,
    actor: &Actor,
    notes: Option<&str>,
) -> Result<StatusRecord, AppError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    // Everything is re-read inside the transaction so the source-stage
    // check and the pointer update see the same state.
    let app = get_application(&tx, application_id)?;
    let stage_id = current_stage_id(&app)?;
    let graph = graph_for_stage(&tx, stage_id)?;

    let transition = graph
        .transitions
        .iter()
        .find(|t| t.id == transition_id)
        .ok_or_else(|| {
            AppError::InvalidTransition(format!(
                "Transition {} does not exist in workflow {}",
                transition_id, graph.workflow.id
            ))
        })?;

    let source = graph.stage(transition.source_stage_id).ok_or(AppError::NotFound)?;
    if transition.source_stage_id != stage_id {
        let current = graph.stage(stage_id).map(|s| s.name.as_str()).unwrap_or("?");
        return Err(AppError::InvalidTransition(format!(
            "Transition '{}' starts from stage '{}' but the application is at '{}'",
            transition.name, source.name, current
        )));
    }

    if !transition.is_automatic && !actor.is_system {
        for code in &transition.required_permissions {
            if !actor.permissions.has(code) {
                return Err(AppError::PermissionDenied(code.clone()));
            }
        }
    }

    let ctx = condition_context(&tx, &app)?;
    if let Some(unmet) = conditions::first_unmet(&transition.conditions, &ctx) {
        return Err(AppError::ConditionNotMet(unmet.to_string()));
    }

    let target = graph.stage(transition.target_stage_id).ok_or(AppError::NotFound)?;
    let target_terminal = graph.is_terminal(target.id);

    tx.execute(
        "INSERT INTO application_statuses \
         (application_id, workflow_stage_id, status, notes, created_by_user_id) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![app.id, target.id, target.name, notes.unwrap_or(""), actor.user_id],
    )?;
    let status_id = tx.last_insert_rowid();

    let changed = tx.execute(
        "UPDATE applications SET current_stage_id = ?1, current_status_id = ?2, \
         status_version = status_version + 1, is_terminal = ?3, updated_at = datetime('now') \
         WHERE id = ?4 AND status_version = ?5",
        params![target.id, status_id, target_terminal as i64, app.id, app.status_version],
    )?;
    if changed == 0 {
        return Err(AppError::InvalidTransition(format!(
            "Application {} was moved by a concurrent transition",
            app.id
        )));
    }

    outbox::enqueue_stage_entry(&tx, app.id, target)?;
    outbox::enqueue_sync(&tx, app.id, &target.name)?;
    tx.commit()?;

    log::info!(
        "Application {} moved '{}' -> '{}' via transition '{}' (actor {})",
        app.id,
        source.name,
        target.name,
        transition.name,
        if actor.is_system { "system".to_string() } else { actor.user_id.to_string() }
    );
    application::find_status_by_id(conn, status_id)?.ok_or(AppError::NotFound)
}

/// Full status history, chronological, oldest first.
pub fn get_status_history(
    conn: &Connection,
    application_id: i64,
) -> Result<Vec<StatusRecord>, AppError> {
    get_application(conn, application_id)?;
    application::status_history(conn, application_id)
}

/// Compare the current stage's required documents and actions against
/// what the application has fulfilled. Read-only.
pub fn check_completeness(
    conn: &Connection,
    application_id: i64,
) -> Result<Completeness, AppError> {
    let app = get_application(conn, application_id)?;
    let stage_id = current_stage_id(&app)?;
    let graph = graph_for_stage(conn, stage_id)?;
    let stage = graph.stage(stage_id).ok_or(AppError::NotFound)?;

    let verified = document::verified_types(conn, app.id)?;
    let completed = application::completed_actions(conn, app.id)?;

    let mut missing: Vec<String> = stage
        .required_documents
        .iter()
        .filter(|doc| !verified.iter().any(|v| &v == doc))
        .cloned()
        .collect();
    missing.extend(
        stage
            .required_actions
            .iter()
            .filter(|action| !completed.iter().any(|c| &c == action))
            .cloned(),
    );

    Ok(Completeness { is_complete: missing.is_empty(), missing_requirements: missing })
}
