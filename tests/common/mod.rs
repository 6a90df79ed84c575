//! Shared test infrastructure for workflow and model tests.
//!
//! `setup_test_db()` builds a temporary SQLite database with the full
//! schema; the helpers below create the roles/users and a standard
//! three-stage admissions workflow most tests start from.

// Not every test binary uses every helper.
#![allow(dead_code)]

use rusqlite::Connection;
use tempfile::TempDir;

use admitd::db::MIGRATIONS;
use admitd::models::role;
use admitd::models::user::{self, NewUser};
use admitd::models::workflow::{self, NewStage, NewTransition, NotificationTrigger};
use admitd::workflow::conditions::{Condition, ConditionOp};

pub const ADMIN_PASS_HASH: &str = "$argon2id$test$not-a-real-hash";

/// Temporary SQLite database with the schema applied.
///
/// Returns (TempDir, Connection); the TempDir must be kept alive for the
/// Connection to remain valid.
pub fn setup_test_db() -> (TempDir, Connection) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = dir.path().join("test.db");
    let conn = Connection::open(&db_path).expect("Failed to open test DB");

    conn.execute_batch("PRAGMA foreign_keys=ON; PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
        .expect("Failed to set pragmas");
    conn.execute_batch(MIGRATIONS).expect("Failed to run migrations");

    (dir, conn)
}

/// Open a second connection against the same database file (for race
/// tests that need two writers).
pub fn open_second_connection(dir: &TempDir) -> Connection {
    let conn = Connection::open(dir.path().join("test.db")).expect("Failed to open second conn");
    conn.execute_batch("PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")
        .expect("Failed to set pragmas");
    conn
}

/// Create a role with the given permission codes and a user in it.
/// Returns the user id.
pub fn create_user_with_permissions(conn: &Connection, username: &str, perms: &[&str]) -> i64 {
    let role_id = role::create(conn, &format!("role_{username}"), username, perms)
        .expect("Failed to create role");
    user::create(
        conn,
        &NewUser {
            username: username.to_string(),
            password_hash: ADMIN_PASS_HASH.to_string(),
            email: format!("{username}@example.edu"),
            display_name: username.to_string(),
            role_id,
        },
    )
    .expect("Failed to create user")
}

pub struct TestWorkflow {
    pub workflow_id: i64,
    pub submitted: i64,
    pub in_review: i64,
    pub decision: i64,
    pub auto_transition: i64,
    pub decide_transition: i64,
}

/// Standard three-stage workflow for the "undergraduate" type:
///
///   Submitted --(auto: documents_verified == true)--> InReview
///   InReview  --(manual, review.decide)-->             Decision
///
/// Created inactive; pass `activate = true` to activate it.
pub fn create_standard_workflow(conn: &mut Connection, created_by: i64, activate: bool) -> TestWorkflow {
    let workflow_id = workflow::create(conn, "Undergraduate Admissions", "undergraduate", created_by)
        .expect("Failed to create workflow");

    let submitted = workflow::create_stage(
        conn,
        workflow_id,
        &NewStage {
            name: "Submitted".to_string(),
            sequence: 1,
            required_documents: vec!["transcript".to_string()],
            required_actions: vec!["fee_paid".to_string()],
            notification_triggers: vec![NotificationTrigger {
                event: "stage.entered".to_string(),
                audience: "applicant".to_string(),
            }],
            assigned_role: "registrar".to_string(),
        },
    )
    .expect("Failed to create Submitted stage");

    let in_review = workflow::create_stage(
        conn,
        workflow_id,
        &NewStage {
            name: "InReview".to_string(),
            sequence: 2,
            required_documents: vec![],
            required_actions: vec![],
            notification_triggers: vec![],
            assigned_role: "reviewer".to_string(),
        },
    )
    .expect("Failed to create InReview stage");

    let decision = workflow::create_stage(
        conn,
        workflow_id,
        &NewStage {
            name: "Decision".to_string(),
            sequence: 3,
            required_documents: vec![],
            required_actions: vec![],
            notification_triggers: vec![],
            assigned_role: String::new(),
        },
    )
    .expect("Failed to create Decision stage");

    let auto_transition = workflow::create_transition(
        conn,
        workflow_id,
        &NewTransition {
            source_stage_id: submitted,
            target_stage_id: in_review,
            name: "start_review".to_string(),
            conditions: vec![Condition {
                field: "documents_verified".to_string(),
                op: ConditionOp::Equals,
                value: serde_json::Value::Bool(true),
            }],
            required_permissions: vec![],
            is_automatic: true,
            is_revision: false,
        },
    )
    .expect("Failed to create start_review transition");

    let decide_transition = workflow::create_transition(
        conn,
        workflow_id,
        &NewTransition {
            source_stage_id: in_review,
            target_stage_id: decision,
            name: "decide".to_string(),
            conditions: vec![],
            required_permissions: vec!["review.decide".to_string()],
            is_automatic: false,
            is_revision: false,
        },
    )
    .expect("Failed to create decide transition");

    if activate {
        workflow::activate(conn, workflow_id).expect("Failed to activate workflow");
    }

    TestWorkflow { workflow_id, submitted, in_review, decision, auto_transition, decide_transition }
}
