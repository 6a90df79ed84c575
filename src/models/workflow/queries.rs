use rusqlite::{Connection, OptionalExtension, params};

use super::types::*;
use crate::errors::AppError;
use crate::workflow::conditions::{self, Condition};
use crate::workflow::validator;

fn row_to_workflow(row: &rusqlite::Row) -> rusqlite::Result<Workflow> {
    Ok(Workflow {
        id: row.get("id")?,
        name: row.get("name")?,
        application_type: row.get("application_type")?,
        is_active: row.get::<_, i64>("is_active")? != 0,
        created_by: row.get::<_, Option<i64>>("created_by")?.unwrap_or(0),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const SELECT_WORKFLOW: &str = "SELECT id, name, application_type, is_active, created_by, \
     created_at, updated_at FROM workflows";

pub fn create(
    conn: &Connection,
    name: &str,
    application_type: &str,
    created_by: i64,
) -> Result<i64, AppError> {
    conn.execute(
        "INSERT INTO workflows (name, application_type, created_by) VALUES (?1, ?2, ?3)",
        params![name, application_type, created_by],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Workflow>, AppError> {
    let sql = format!("{SELECT_WORKFLOW} WHERE id = ?1");
    let workflow = conn
        .query_row(&sql, params![id], row_to_workflow)
        .optional()?;
    Ok(workflow)
}

pub fn list_all(conn: &Connection) -> Result<Vec<Workflow>, AppError> {
    let sql = format!("{SELECT_WORKFLOW} ORDER BY application_type, id");
    let mut stmt = conn.prepare(&sql)?;
    let workflows = stmt
        .query_map([], row_to_workflow)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(workflows)
}

/// The single active workflow for an application type, if any.
pub fn get_active(conn: &Connection, application_type: &str) -> Result<Option<Workflow>, AppError> {
    let sql = format!("{SELECT_WORKFLOW} WHERE application_type = ?1 AND is_active = 1");
    let workflow = conn
        .query_row(&sql, params![application_type], row_to_workflow)
        .optional()?;
    Ok(workflow)
}

/// Definitions may only change while the workflow is inactive.
fn require_inactive(conn: &Connection, workflow_id: i64) -> Result<(), AppError> {
    let workflow = find_by_id(conn, workflow_id)?.ok_or(AppError::NotFound)?;
    if workflow.is_active {
        return Err(AppError::Validation(format!(
            "Workflow {} is active; deactivate it before editing",
            workflow_id
        )));
    }
    Ok(())
}

pub fn create_stage(conn: &Connection, workflow_id: i64, stage: &NewStage) -> Result<i64, AppError> {
    require_inactive(conn, workflow_id)?;
    conn.execute(
        "INSERT INTO workflow_stages \
         (workflow_id, name, sequence, required_documents, required_actions, \
          notification_triggers, assigned_role) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            workflow_id,
            stage.name,
            stage.sequence,
            serde_json::to_string(&stage.required_documents).unwrap_or_else(|_| "[]".into()),
            serde_json::to_string(&stage.required_actions).unwrap_or_else(|_| "[]".into()),
            serde_json::to_string(&stage.notification_triggers).unwrap_or_else(|_| "[]".into()),
            stage.assigned_role,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_stage(
    conn: &Connection,
    workflow_id: i64,
    stage_id: i64,
    stage: &NewStage,
) -> Result<(), AppError> {
    require_inactive(conn, workflow_id)?;
    let changed = conn.execute(
        "UPDATE workflow_stages SET name = ?1, sequence = ?2, required_documents = ?3, \
         required_actions = ?4, notification_triggers = ?5, assigned_role = ?6 \
         WHERE id = ?7 AND workflow_id = ?8",
        params![
            stage.name,
            stage.sequence,
            serde_json::to_string(&stage.required_documents).unwrap_or_else(|_| "[]".into()),
            serde_json::to_string(&stage.required_actions).unwrap_or_else(|_| "[]".into()),
            serde_json::to_string(&stage.notification_triggers).unwrap_or_else(|_| "[]".into()),
            stage.assigned_role,
            stage_id,
            workflow_id,
        ],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

/// Delete a stage. Refused while status history still references it, per
/// the on-delete policy on history rows (history must stay intact).
pub fn delete_stage(conn: &Connection, workflow_id: i64, stage_id: i64) -> Result<(), AppError> {
    require_inactive(conn, workflow_id)?;
    let referenced: i64 = conn.query_row(
        "SELECT COUNT(*) FROM application_statuses WHERE workflow_stage_id = ?1",
        params![stage_id],
        |row| row.get(0),
    )?;
    if referenced > 0 {
        return Err(AppError::Validation(format!(
            "Stage {} is referenced by {} status record(s) and cannot be deleted",
            stage_id, referenced
        )));
    }
    let changed = conn.execute(
        "DELETE FROM workflow_stages WHERE id = ?1 AND workflow_id = ?2",
        params![stage_id, workflow_id],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

pub fn create_transition(
    conn: &Connection,
    workflow_id: i64,
    transition: &NewTransition,
) -> Result<i64, AppError> {
    require_inactive(conn, workflow_id)?;
    conn.execute(
        "INSERT INTO workflow_transitions \
         (workflow_id, source_stage_id, target_stage_id, name, conditions, \
          required_permissions, is_automatic, is_revision) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            workflow_id,
            transition.source_stage_id,
            transition.target_stage_id,
            transition.name,
            serde_json::to_string(&transition.conditions).unwrap_or_else(|_| "[]".into()),
            serde_json::to_string(&transition.required_permissions)
                .unwrap_or_else(|_| "[]".into()),
            transition.is_automatic as i64,
            transition.is_revision as i64,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_transition(
    conn: &Connection,
    workflow_id: i64,
    transition_id: i64,
    transition: &NewTransition,
) -> Result<(), AppError> {
    require_inactive(conn, workflow_id)?;
    let changed = conn.execute(
        "UPDATE workflow_transitions SET source_stage_id = ?1, target_stage_id = ?2, \
         name = ?3, conditions = ?4, required_permissions = ?5, is_automatic = ?6, \
         is_revision = ?7 WHERE id = ?8 AND workflow_id = ?9",
        params![
            transition.source_stage_id,
            transition.target_stage_id,
            transition.name,
            serde_json::to_string(&transition.conditions).unwrap_or_else(|_| "[]".into()),
            serde_json::to_string(&transition.required_permissions)
                .unwrap_or_else(|_| "[]".into()),
            transition.is_automatic as i64,
            transition.is_revision as i64,
            transition_id,
            workflow_id,
        ],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

pub fn delete_transition(
    conn: &Connection,
    workflow_id: i64,
    transition_id: i64,
) -> Result<(), AppError> {
    require_inactive(conn, workflow_id)?;
    let changed = conn.execute(
        "DELETE FROM workflow_transitions WHERE id = ?1 AND workflow_id = ?2",
        params![transition_id, workflow_id],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

fn decode_string_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Load the full definition graph for a workflow, decoding the JSON
/// columns into typed structs. Stored conditions are validated at write
/// time, so a decode failure here means the row was edited out of band.
pub fn load_graph(conn: &Connection, workflow_id: i64) -> Result<WorkflowGraph, AppError> {
    let workflow = find_by_id(conn, workflow_id)?.ok_or(AppError::NotFound)?;

    let mut stmt = conn.prepare(
        "SELECT id, workflow_id, name, sequence, required_documents, required_actions, \
         notification_triggers, assigned_role \
         FROM workflow_stages WHERE workflow_id = ?1 ORDER BY sequence, id",
    )?;
    let stages = stmt
        .query_map(params![workflow_id], |row| {
            let required_documents: String = row.get("required_documents")?;
            let required_actions: String = row.get("required_actions")?;
            let notification_triggers: String = row.get("notification_triggers")?;
            Ok(WorkflowStage {
                id: row.get("id")?,
                workflow_id: row.get("workflow_id")?,
                name: row.get("name")?,
                sequence: row.get("sequence")?,
                required_documents: decode_string_list(&required_documents),
                required_actions: decode_string_list(&required_actions),
                notification_triggers: serde_json::from_str(&notification_triggers)
                    .unwrap_or_default(),
                assigned_role: row.get("assigned_role")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, workflow_id, source_stage_id, target_stage_id, name, conditions, \
         required_permissions, is_automatic, is_revision \
         FROM workflow_transitions WHERE workflow_id = ?1 ORDER BY id",
    )?;
    let raw_transitions = stmt
        .query_map(params![workflow_id], |row| {
            let conditions: String = row.get("conditions")?;
            let required_permissions: String = row.get("required_permissions")?;
            Ok((
                conditions,
                WorkflowTransition {
                    id: row.get("id")?,
                    workflow_id: row.get("workflow_id")?,
                    source_stage_id: row.get("source_stage_id")?,
                    target_stage_id: row.get("target_stage_id")?,
                    name: row.get("name")?,
                    conditions: Vec::new(),
                    required_permissions: decode_string_list(&required_permissions),
                    is_automatic: row.get::<_, i64>("is_automatic")? != 0,
                    is_revision: row.get::<_, i64>("is_revision")? != 0,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut transitions = Vec::with_capacity(raw_transitions.len());
    for (raw_conditions, mut transition) in raw_transitions {
        let decoded: Vec<Condition> = conditions::decode(&raw_conditions).map_err(|e| {
            AppError::Validation(format!(
                "Transition {} has malformed conditions: {}",
                transition.id, e
            ))
        })?;
        transition.conditions = decoded;
        transitions.push(transition);
    }

    Ok(WorkflowGraph { workflow, stages, transitions })
}

/// Activate a workflow. Validates the graph first (activation fails with
/// the full problem list and no mutation), then swaps the active flag for
/// the application type in one transaction so at most one workflow per
/// type is ever active.
pub fn activate(
    conn: &mut Connection,
    workflow_id: i64,
) -> Result<(), AppError> {
    let graph = load_graph(conn, workflow_id)?;
    let known_permissions = crate::models::role::permission_catalog(conn)?;
    let problems = validator::validate(&graph, &known_permissions);
    if !problems.is_empty() {
        return Err(AppError::WorkflowInvalid(problems));
    }

    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE workflows SET is_active = 0, updated_at = datetime('now') \
         WHERE application_type = ?1 AND is_active = 1",
        params![graph.workflow.application_type],
    )?;
    tx.execute(
        "UPDATE workflows SET is_active = 1, updated_at = datetime('now') WHERE id = ?1",
        params![workflow_id],
    )?;
    tx.commit()?;
    Ok(())
}

/// Deactivate without activating a replacement. In-flight applications
/// keep their current stage; new submissions of the type will fail until
/// another workflow is activated.
pub fn deactivate(conn: &Connection, workflow_id: i64) -> Result<(), AppError> {
    let changed = conn.execute(
        "UPDATE workflows SET is_active = 0, updated_at = datetime('now') WHERE id = ?1",
        params![workflow_id],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}
