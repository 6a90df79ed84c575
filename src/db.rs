use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::errors::AppError;
use crate::models::workflow::{self, NewStage, NewTransition};
use crate::models::{role, user};
use crate::workflow::conditions::{Condition, ConditionOp};

pub type DbPool = Pool<SqliteConnectionManager>;

pub const MIGRATIONS: &str = include_str!("schema.sql");

pub fn init_pool(database_url: &str) -> DbPool {
    let manager = SqliteConnectionManager::file(database_url).with_init(|conn| {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;",
        )?;
        Ok(())
    });
    Pool::builder()
        .max_size(8)
        .build(manager)
        .expect("Failed to create DB pool")
}

pub fn run_migrations(pool: &DbPool) {
    let conn = pool.get().expect("Failed to get DB connection for migrations");
    conn.execute_batch(MIGRATIONS)
        .expect("Failed to run migrations");
    log::info!("Database migrations complete");
}

/// Seed roles, permissions, the admin user, and a default undergraduate
/// workflow. Skipped entirely if any user already exists.
pub fn seed_defaults(pool: &DbPool, admin_password_hash: &str) {
    let mut conn = pool.get().expect("Failed to get DB connection for seeding");

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
        .unwrap_or(0);
    if count > 0 {
        log::info!("Database already seeded ({} users), skipping seed", count);
        return;
    }

    if let Err(e) = seed_inner(&mut conn, admin_password_hash) {
        log::error!("Seed failed: {}", e);
        return;
    }
    log::info!("Default seed complete");
}

fn seed_inner(conn: &mut rusqlite::Connection, admin_password_hash: &str) -> Result<(), AppError> {
    let admin_role = role::create(
        conn,
        "admin",
        "Administrator",
        &[
            "admin.users",
            "workflow.manage",
            "application.view",
            "application.submit",
            "document.verify",
            "payment.process",
            "message.send",
            "review.start",
            "review.decide",
            "audit.view",
            "outbox.manage",
        ],
    )?;
    role::create(
        conn,
        "registrar",
        "Registrar",
        &[
            "application.view",
            "document.verify",
            "payment.process",
            "message.send",
            "review.start",
        ],
    )?;
    role::create(
        conn,
        "reviewer",
        "Admissions Reviewer",
        &["application.view", "message.send", "review.start", "review.decide"],
    )?;
    role::create(
        conn,
        "applicant",
        "Applicant",
        &["application.submit", "message.send"],
    )?;

    let admin_id = user::create(
        conn,
        &user::NewUser {
            username: "admin".to_string(),
            password_hash: admin_password_hash.to_string(),
            email: "admin@example.edu".to_string(),
            display_name: "Administrator".to_string(),
            role_id: admin_role,
        },
    )?;

    seed_default_workflow(conn, admin_id)?;
    Ok(())
}

/// Default admissions workflow: Submitted -> InReview -> Decision, with an
/// automatic first hop once all required documents are verified.
fn seed_default_workflow(conn: &mut rusqlite::Connection, created_by: i64) -> Result<(), AppError> {
    let wf_id = workflow::create(conn, "Undergraduate Admissions", "undergraduate", created_by)?;

    let submitted = workflow::create_stage(
        conn,
        wf_id,
        &NewStage {
            name: "Submitted".to_string(),
            sequence: 1,
            required_documents: vec!["transcript".to_string(), "recommendation".to_string()],
            required_actions: vec!["fee_paid".to_string()],
            notification_triggers: vec![workflow::NotificationTrigger {
                event: "stage.entered".to_string(),
                audience: "applicant".to_string(),
            }],
            assigned_role: "registrar".to_string(),
        },
    )?;
    let in_review = workflow::create_stage(
        conn,
        wf_id,
        &NewStage {
            name: "InReview".to_string(),
            sequence: 2,
            required_documents: vec![],
            required_actions: vec![],
            notification_triggers: vec![workflow::NotificationTrigger {
                event: "stage.entered".to_string(),
                audience: "reviewer".to_string(),
            }],
            assigned_role: "reviewer".to_string(),
        },
    )?;
    let decision = workflow::create_stage(
        conn,
        wf_id,
        &NewStage {
            name: "Decision".to_string(),
            sequence: 3,
            required_documents: vec![],
            required_actions: vec![],
            notification_triggers: vec![workflow::NotificationTrigger {
                event: "stage.entered".to_string(),
                audience: "applicant".to_string(),
            }],
            assigned_role: "".to_string(),
        },
    )?;

    workflow::create_transition(
        conn,
        wf_id,
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
    )?;
    workflow::create_transition(
        conn,
        wf_id,
        &NewTransition {
            source_stage_id: in_review,
            target_stage_id: decision,
            name: "decide".to_string(),
            conditions: vec![],
            required_permissions: vec!["review.decide".to_string()],
            is_automatic: false,
            is_revision: false,
        },
    )?;

    workflow::activate(conn, wf_id)?;
    log::info!(
        "Seeded default workflow {} (stages {}, {}, {})",
        wf_id,
        submitted,
        in_review,
        decision
    );
    Ok(())
}
