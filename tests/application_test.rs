mod common;

use admitd::models::{application, document, message, payment};
use serde_json::json;

use common::{create_user_with_permissions, setup_test_db};

#[test]
fn application_data_round_trips_and_updates() {
    let (_dir, conn) = setup_test_db();
    let applicant = create_user_with_permissions(&conn, "alice", &[]);

    let app_id =
        application::create(&conn, applicant, "undergraduate", &json!({"gpa": 3.4})).unwrap();
    let app = application::find_by_id(&conn, app_id).unwrap().unwrap();
    assert_eq!(app.data["gpa"], json!(3.4));
    assert_eq!(app.current_stage_id, None);
    assert_eq!(app.status_version, 0);

    application::update_data(&conn, app_id, &json!({"gpa": 3.7, "essay": "done"})).unwrap();
    let app = application::find_by_id(&conn, app_id).unwrap().unwrap();
    assert_eq!(app.data["gpa"], json!(3.7));
    assert_eq!(app.data["essay"], json!("done"));

    let err = application::update_data(&conn, 9999, &json!({})).unwrap_err();
    assert!(matches!(err, admitd::errors::AppError::NotFound));
}

#[test]
fn listing_scopes_to_the_applicant() {
    let (_dir, conn) = setup_test_db();
    let alice = create_user_with_permissions(&conn, "alice", &[]);
    let bob = create_user_with_permissions(&conn, "bob", &[]);

    application::create(&conn, alice, "undergraduate", &json!({})).unwrap();
    application::create(&conn, alice, "graduate", &json!({})).unwrap();
    application::create(&conn, bob, "undergraduate", &json!({})).unwrap();

    assert_eq!(application::list_all(&conn).unwrap().len(), 3);
    assert_eq!(application::list_for_applicant(&conn, alice).unwrap().len(), 2);
    assert_eq!(application::list_for_applicant(&conn, bob).unwrap().len(), 1);
}

#[test]
fn only_verified_documents_count() {
    let (_dir, conn) = setup_test_db();
    let applicant = create_user_with_permissions(&conn, "alice", &[]);
    let app_id = application::create(&conn, applicant, "undergraduate", &json!({})).unwrap();

    let transcript = document::create(&conn, app_id, "transcript", "t.pdf", applicant).unwrap();
    let rec = document::create(&conn, app_id, "recommendation", "r.pdf", applicant).unwrap();

    // Uploads start pending and count for nothing.
    assert!(document::verified_types(&conn, app_id).unwrap().is_empty());

    document::set_verification(&conn, transcript, document::STATUS_VERIFIED, 0.92).unwrap();
    document::set_verification(&conn, rec, document::STATUS_REJECTED, 0.4).unwrap();

    assert_eq!(document::verified_types(&conn, app_id).unwrap(), vec!["transcript"]);

    let doc = document::find_by_id(&conn, transcript).unwrap().unwrap();
    assert_eq!(doc.verification_status, document::STATUS_VERIFIED);
    assert_eq!(doc.confidence, Some(0.92));
    assert!(doc.verified_at.is_some());
}

#[test]
fn completed_payment_marks_the_fact() {
    let (_dir, conn) = setup_test_db();
    let applicant = create_user_with_permissions(&conn, "alice", &[]);
    let app_id = application::create(&conn, applicant, "undergraduate", &json!({})).unwrap();

    let pay_id = payment::create(&conn, app_id, 7500, "USD", "application_fee").unwrap();
    assert!(!payment::has_completed(&conn, app_id).unwrap());

    payment::set_outcome(&conn, pay_id, payment::STATUS_FAILED, "").unwrap();
    assert!(!payment::has_completed(&conn, app_id).unwrap());

    payment::set_outcome(&conn, pay_id, payment::STATUS_COMPLETED, "ref-123").unwrap();
    assert!(payment::has_completed(&conn, app_id).unwrap());

    let recorded = payment::find_by_id(&conn, pay_id).unwrap().unwrap();
    assert_eq!(recorded.gateway_reference, "ref-123");
}

#[test]
fn completing_an_action_is_idempotent() {
    let (_dir, conn) = setup_test_db();
    let applicant = create_user_with_permissions(&conn, "alice", &[]);
    let app_id = application::create(&conn, applicant, "undergraduate", &json!({})).unwrap();

    application::complete_action(&conn, app_id, "fee_paid", applicant).unwrap();
    application::complete_action(&conn, app_id, "fee_paid", applicant).unwrap();

    assert_eq!(application::completed_actions(&conn, app_id).unwrap(), vec!["fee_paid"]);
}

#[test]
fn message_thread_tracks_read_state() {
    let (_dir, conn) = setup_test_db();
    let alice = create_user_with_permissions(&conn, "alice", &[]);
    let bob = create_user_with_permissions(&conn, "bob", &[]);
    let app_id = application::create(&conn, alice, "undergraduate", &json!({})).unwrap();

    message::create(&conn, app_id, bob, "Please upload your transcript").unwrap();
    message::create(&conn, app_id, alice, "Done, thanks").unwrap();

    let thread = message::list_for_application(&conn, app_id).unwrap();
    assert_eq!(thread.len(), 2);
    assert_eq!(thread[0].sender_name, "bob");
    assert!(thread.iter().all(|m| m.read_at.is_none()));

    // Alice reads: only bob's message flips.
    let marked = message::mark_read(&conn, app_id, alice).unwrap();
    assert_eq!(marked, 1);
    let thread = message::list_for_application(&conn, app_id).unwrap();
    assert!(thread[0].read_at.is_some());
    assert!(thread[1].read_at.is_none());
}
