mod common;

use admitd::auth::session::Actor;
use admitd::integrations::{IntegrationSync, NotificationDispatcher};
use admitd::models::{application, document};
use admitd::workflow::{engine, outbox};
use rusqlite::Connection;
use serde_json::{Value, json};

use common::{create_standard_workflow, create_user_with_permissions, setup_test_db};

struct OkNotifier;

impl NotificationDispatcher for OkNotifier {
    fn dispatch(&self, _event: &str, _audience: &str, _context: &Value) -> Result<(), String> {
        Ok(())
    }
}

struct FailingNotifier;

impl NotificationDispatcher for FailingNotifier {
    fn dispatch(&self, _event: &str, _audience: &str, _context: &Value) -> Result<(), String> {
        Err("smtp unreachable".to_string())
    }
}

struct OkSync;

impl IntegrationSync for OkSync {
    fn sync_on_status_change(&self, _application_id: i64, _stage_name: &str) -> Result<(), String> {
        Ok(())
    }
}

fn pending_count(conn: &Connection) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM side_effect_outbox WHERE status = 'pending'",
        [],
        |row| row.get(0),
    )
    .unwrap()
}

fn force_due(conn: &Connection) {
    conn.execute_batch(
        "UPDATE side_effect_outbox SET next_attempt_at = datetime('now', '-1 minute')",
    )
    .unwrap();
}

/// Walk a fresh application into InReview, leaving intents in the outbox.
fn seed_application_with_transition(conn: &mut Connection) -> i64 {
    let admin = create_user_with_permissions(conn, "admin", &[]);
    let wf = create_standard_workflow(conn, admin, true);
    let applicant = create_user_with_permissions(conn, "alice", &[]);

    let app_id = application::create(conn, applicant, "undergraduate", &json!({})).unwrap();
    engine::initialize(conn, app_id, &Actor::system()).unwrap();
    let doc_id = document::create(conn, app_id, "transcript", "t.pdf", applicant).unwrap();
    document::set_verification(conn, doc_id, document::STATUS_VERIFIED, 0.9).unwrap();
    engine::execute_transition(conn, app_id, wf.auto_transition, &Actor::system(), None).unwrap();
    app_id
}

#[test]
fn transitions_enqueue_side_effect_intents() {
    let (_dir, mut conn) = setup_test_db();
    let app_id = seed_application_with_transition(&mut conn);

    // One notification from entering Submitted, one sync from the hop to
    // InReview. (InReview has no trigger in the standard workflow.)
    let mut stmt = conn
        .prepare("SELECT kind FROM side_effect_outbox WHERE application_id = ?1 ORDER BY id")
        .unwrap();
    let kinds: Vec<String> = stmt
        .query_map([app_id], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(kinds, vec![outbox::KIND_NOTIFICATION, outbox::KIND_SIS_SYNC]);
}

#[test]
fn deliver_due_dispatches_and_marks_entries() {
    let (_dir, mut conn) = setup_test_db();
    seed_application_with_transition(&mut conn);
    assert_eq!(pending_count(&conn), 2);

    let (delivered, failed) = outbox::deliver_due(&conn, &OkNotifier, &OkSync).unwrap();
    assert_eq!((delivered, failed), (2, 0));
    assert_eq!(pending_count(&conn), 0);

    // Nothing left to do on the next pass.
    let (delivered, failed) = outbox::deliver_due(&conn, &OkNotifier, &OkSync).unwrap();
    assert_eq!((delivered, failed), (0, 0));
}

#[test]
fn failed_deliveries_back_off_and_dead_letter() {
    let (_dir, mut conn) = setup_test_db();
    let admin = create_user_with_permissions(&conn, "admin", &[]);
    create_standard_workflow(&mut conn, admin, true);
    let applicant = create_user_with_permissions(&conn, "alice", &[]);
    let app_id = application::create(&conn, applicant, "undergraduate", &json!({})).unwrap();
    engine::initialize(&mut conn, app_id, &Actor::system()).unwrap();
    assert_eq!(pending_count(&conn), 1);

    let (_, failed) = outbox::deliver_due(&conn, &FailingNotifier, &OkSync).unwrap();
    assert_eq!(failed, 1);

    // First failure schedules a retry in the future, so an immediate pass
    // skips the entry.
    let (delivered, failed) = outbox::deliver_due(&conn, &FailingNotifier, &OkSync).unwrap();
    assert_eq!((delivered, failed), (0, 0));

    // Burn through the remaining attempts.
    for _ in 0..4 {
        force_due(&conn);
        outbox::deliver_due(&conn, &FailingNotifier, &OkSync).unwrap();
    }

    let dead = outbox::list_failed(&conn).unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 5);
    assert_eq!(dead[0].last_error.as_deref(), Some("smtp unreachable"));

    // A dead-lettered entry is out of the queue for good until retried.
    force_due(&conn);
    let (delivered, failed) = outbox::deliver_due(&conn, &FailingNotifier, &OkSync).unwrap();
    assert_eq!((delivered, failed), (0, 0));
}

#[test]
fn operator_retry_requeues_a_dead_letter() {
    let (_dir, mut conn) = setup_test_db();
    let admin = create_user_with_permissions(&conn, "admin", &[]);
    create_standard_workflow(&mut conn, admin, true);
    let applicant = create_user_with_permissions(&conn, "alice", &[]);
    let app_id = application::create(&conn, applicant, "undergraduate", &json!({})).unwrap();
    engine::initialize(&mut conn, app_id, &Actor::system()).unwrap();

    for _ in 0..5 {
        force_due(&conn);
        outbox::deliver_due(&conn, &FailingNotifier, &OkSync).unwrap();
    }
    let dead = outbox::list_failed(&conn).unwrap();
    assert_eq!(dead.len(), 1);

    outbox::retry_failed(&conn, dead[0].id).unwrap();
    assert_eq!(pending_count(&conn), 1);

    // Recovered backend: the retried entry goes out.
    let (delivered, failed) = outbox::deliver_due(&conn, &OkNotifier, &OkSync).unwrap();
    assert_eq!((delivered, failed), (1, 0));
    assert!(outbox::list_failed(&conn).unwrap().is_empty());

    // Retrying a non-failed entry is an error.
    assert!(outbox::retry_failed(&conn, dead[0].id).is_err());
}
