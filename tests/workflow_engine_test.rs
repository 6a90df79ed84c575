mod common;

use admitd::auth::session::{Actor, Permissions};
use admitd::errors::AppError;
use admitd::models::{application, document};
use admitd::workflow::engine;
use serde_json::json;

use common::{create_standard_workflow, create_user_with_permissions, setup_test_db};

fn reviewer_actor(user_id: i64) -> Actor {
    Actor::user(user_id, Permissions(vec!["review.decide".to_string()]))
}

#[test]
fn initialize_places_application_at_entry_stage() {
    let (_dir, mut conn) = setup_test_db();
    let admin = create_user_with_permissions(&conn, "admin", &["workflow.manage"]);
    let wf = create_standard_workflow(&mut conn, admin, true);
    let applicant = create_user_with_permissions(&conn, "alice", &["application.submit"]);

    let app_id = application::create(&conn, applicant, "undergraduate", &json!({"gpa": 3.4}))
        .expect("create application");
    let record = engine::initialize(&mut conn, app_id, &Actor::user(applicant, Permissions::default()))
        .expect("initialize");

    assert_eq!(record.status, "Submitted");
    assert_eq!(record.workflow_stage_id, Some(wf.submitted));

    let app = application::find_by_id(&conn, app_id).unwrap().unwrap();
    assert_eq!(app.current_stage_id, Some(wf.submitted));
    assert_eq!(app.current_status_id, Some(record.id));
    assert_eq!(app.status_version, 1);
    assert!(!app.is_terminal);

    let history = engine::get_status_history(&conn, app_id).expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, "Submitted");
}

#[test]
fn initialize_without_active_workflow_fails() {
    let (_dir, mut conn) = setup_test_db();
    let admin = create_user_with_permissions(&conn, "admin", &[]);
    create_standard_workflow(&mut conn, admin, false);
    let applicant = create_user_with_permissions(&conn, "alice", &[]);

    let app_id = application::create(&conn, applicant, "undergraduate", &json!({})).unwrap();
    let err = engine::initialize(&mut conn, app_id, &Actor::system()).unwrap_err();
    assert!(matches!(err, AppError::NoActiveWorkflow(ref t) if t == "undergraduate"));
}

#[test]
fn reinitialize_is_rejected() {
    let (_dir, mut conn) = setup_test_db();
    let admin = create_user_with_permissions(&conn, "admin", &[]);
    create_standard_workflow(&mut conn, admin, true);
    let applicant = create_user_with_permissions(&conn, "alice", &[]);

    let app_id = application::create(&conn, applicant, "undergraduate", &json!({})).unwrap();
    engine::initialize(&mut conn, app_id, &Actor::system()).expect("first initialize");

    let err = engine::initialize(&mut conn, app_id, &Actor::system()).unwrap_err();
    assert!(matches!(err, AppError::AlreadyInitialized(id) if id == app_id));

    // The failed attempt must not have appended history.
    let history = engine::get_status_history(&conn, app_id).unwrap();
    assert_eq!(history.len(), 1);
}

#[test]
fn automatic_transition_blocked_until_documents_verified() {
    let (_dir, mut conn) = setup_test_db();
    let admin = create_user_with_permissions(&conn, "admin", &[]);
    let wf = create_standard_workflow(&mut conn, admin, true);
    let applicant = create_user_with_permissions(&conn, "alice", &[]);

    let app_id = application::create(&conn, applicant, "undergraduate", &json!({})).unwrap();
    engine::initialize(&mut conn, app_id, &Actor::system()).unwrap();

    // No verified transcript yet: the condition fails.
    let err = engine::execute_transition(&mut conn, app_id, wf.auto_transition, &Actor::system(), None)
        .unwrap_err();
    assert!(matches!(err, AppError::ConditionNotMet(_)));

    let doc_id = document::create(&conn, app_id, "transcript", "transcript.pdf", applicant).unwrap();
    document::set_verification(&conn, doc_id, document::STATUS_VERIFIED, 0.9).unwrap();

    let record =
        engine::execute_transition(&mut conn, app_id, wf.auto_transition, &Actor::system(), None)
            .expect("transition after verification");
    assert_eq!(record.status, "InReview");
}

#[test]
fn manual_transition_requires_permission() {
    let (_dir, mut conn) = setup_test_db();
    let admin = create_user_with_permissions(&conn, "admin", &[]);
    let wf = create_standard_workflow(&mut conn, admin, true);
    let applicant = create_user_with_permissions(&conn, "alice", &[]);
    let reviewer = create_user_with_permissions(&conn, "bob", &["review.decide"]);

    let app_id = application::create(&conn, applicant, "undergraduate", &json!({})).unwrap();
    engine::initialize(&mut conn, app_id, &Actor::system()).unwrap();
    let doc_id = document::create(&conn, app_id, "transcript", "t.pdf", applicant).unwrap();
    document::set_verification(&conn, doc_id, document::STATUS_VERIFIED, 0.9).unwrap();
    engine::execute_transition(&mut conn, app_id, wf.auto_transition, &Actor::system(), None).unwrap();

    // Applicant lacks review.decide.
    let unprivileged = Actor::user(applicant, Permissions::default());
    let err = engine::execute_transition(&mut conn, app_id, wf.decide_transition, &unprivileged, None)
        .unwrap_err();
    assert!(matches!(err, AppError::PermissionDenied(ref code) if code == "review.decide"));
    // The denied attempt left no trace.
    assert_eq!(engine::get_status_history(&conn, app_id).unwrap().len(), 2);

    let record = engine::execute_transition(
        &mut conn,
        app_id,
        wf.decide_transition,
        &reviewer_actor(reviewer),
        Some("admitted"),
    )
    .expect("decide");
    assert_eq!(record.status, "Decision");
    assert_eq!(record.notes, "admitted");

    let app = application::find_by_id(&conn, app_id).unwrap().unwrap();
    assert!(app.is_terminal);
    assert_eq!(app.status_version, 3);
}

#[test]
fn transition_from_wrong_stage_is_rejected() {
    let (_dir, mut conn) = setup_test_db();
    let admin = create_user_with_permissions(&conn, "admin", &[]);
    let wf = create_standard_workflow(&mut conn, admin, true);
    let applicant = create_user_with_permissions(&conn, "alice", &[]);

    let app_id = application::create(&conn, applicant, "undergraduate", &json!({})).unwrap();
    engine::initialize(&mut conn, app_id, &Actor::system()).unwrap();
    let doc_id = document::create(&conn, app_id, "transcript", "t.pdf", applicant).unwrap();
    document::set_verification(&conn, doc_id, document::STATUS_VERIFIED, 0.9).unwrap();
    engine::execute_transition(&mut conn, app_id, wf.auto_transition, &Actor::system(), None).unwrap();

    // The application is now at InReview; start_review starts at Submitted.
    let err = engine::execute_transition(&mut conn, app_id, wf.auto_transition, &Actor::system(), None)
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));
}

#[test]
fn history_is_append_only_and_chronological() {
    let (_dir, mut conn) = setup_test_db();
    let admin = create_user_with_permissions(&conn, "admin", &[]);
    let wf = create_standard_workflow(&mut conn, admin, true);
    let applicant = create_user_with_permissions(&conn, "alice", &[]);
    let reviewer = create_user_with_permissions(&conn, "bob", &["review.decide"]);

    let app_id = application::create(&conn, applicant, "undergraduate", &json!({})).unwrap();
    engine::initialize(&mut conn, app_id, &Actor::system()).unwrap();
    let doc_id = document::create(&conn, app_id, "transcript", "t.pdf", applicant).unwrap();
    document::set_verification(&conn, doc_id, document::STATUS_VERIFIED, 0.9).unwrap();
    engine::execute_transition(&mut conn, app_id, wf.auto_transition, &Actor::system(), None).unwrap();
    engine::execute_transition(&mut conn, app_id, wf.decide_transition, &reviewer_actor(reviewer), None)
        .unwrap();

    let history = engine::get_status_history(&conn, app_id).unwrap();
    let statuses: Vec<&str> = history.iter().map(|r| r.status.as_str()).collect();
    assert_eq!(statuses, vec!["Submitted", "InReview", "Decision"]);
    // Ids ascend with the walk; nothing was rewritten in place.
    assert!(history.windows(2).all(|w| w[0].id < w[1].id));
}

#[test]
fn available_transitions_filters_by_actor_permissions() {
    let (_dir, mut conn) = setup_test_db();
    let admin = create_user_with_permissions(&conn, "admin", &[]);
    let wf = create_standard_workflow(&mut conn, admin, true);
    let applicant = create_user_with_permissions(&conn, "alice", &[]);
    let reviewer = create_user_with_permissions(&conn, "bob", &["review.decide"]);

    let app_id = application::create(&conn, applicant, "undergraduate", &json!({})).unwrap();
    engine::initialize(&mut conn, app_id, &Actor::system()).unwrap();
    let doc_id = document::create(&conn, app_id, "transcript", "t.pdf", applicant).unwrap();
    document::set_verification(&conn, doc_id, document::STATUS_VERIFIED, 0.9).unwrap();
    engine::execute_transition(&mut conn, app_id, wf.auto_transition, &Actor::system(), None).unwrap();

    let for_applicant =
        engine::available_transitions(&conn, app_id, &Actor::user(applicant, Permissions::default()))
            .unwrap();
    assert!(for_applicant.is_empty());

    let for_reviewer =
        engine::available_transitions(&conn, app_id, &reviewer_actor(reviewer)).unwrap();
    assert_eq!(for_reviewer.len(), 1);
    assert_eq!(for_reviewer[0].name, "decide");
    assert_eq!(for_reviewer[0].target_stage_id, wf.decision);
}

#[test]
fn completeness_reports_missing_then_fulfilled_requirements() {
    let (_dir, mut conn) = setup_test_db();
    let admin = create_user_with_permissions(&conn, "admin", &[]);
    create_standard_workflow(&mut conn, admin, true);
    let applicant = create_user_with_permissions(&conn, "alice", &[]);

    let app_id = application::create(&conn, applicant, "undergraduate", &json!({})).unwrap();
    engine::initialize(&mut conn, app_id, &Actor::system()).unwrap();

    let report = engine::check_completeness(&conn, app_id).unwrap();
    assert!(!report.is_complete);
    assert_eq!(report.missing_requirements, vec!["transcript", "fee_paid"]);

    let doc_id = document::create(&conn, app_id, "transcript", "t.pdf", applicant).unwrap();
    document::set_verification(&conn, doc_id, document::STATUS_VERIFIED, 0.9).unwrap();

    let report = engine::check_completeness(&conn, app_id).unwrap();
    assert_eq!(report.missing_requirements, vec!["fee_paid"]);

    application::complete_action(&conn, app_id, "fee_paid", applicant).unwrap();
    let report = engine::check_completeness(&conn, app_id).unwrap();
    assert!(report.is_complete);
    assert!(report.missing_requirements.is_empty());
}
