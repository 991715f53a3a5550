// Applicant state machine under repetition and concurrency
//
// - Reject is idempotent; approve after reject is refused
// - Concurrent approvals create exactly one student
// - Concurrent approvals of different applicants never share a matric number

#[path = "../helpers/mod.rs"]
mod helpers;

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;

use enrollment_core::core::AppError;
use enrollment_core::modules::applicants::ApplicantStatus;
use enrollment_core::modules::enrollment::EnrollmentStore;

use helpers::*;

#[tokio::test]
async fn test_double_reject_is_a_no_op() {
    let app = TestApp::new();
    let applicant_id = app.submit().await;

    let first = app.state.approvals.reject(&admin(), &applicant_id).await.unwrap();
    let first_reviewed_at = first.reviewed_at;

    let second = app.state.approvals.reject(&staff(), &applicant_id).await.unwrap();

    assert_eq!(second.status, ApplicantStatus::Rejected);
    assert_eq!(second.reviewed_by.as_deref(), Some("admin-1"), "second reject does not overwrite");
    assert_eq!(second.reviewed_at, first_reviewed_at);
}

#[tokio::test]
async fn test_approve_after_reject_is_refused() {
    let app = TestApp::new();
    let applicant_id = app.submit().await;
    app.state.approvals.reject(&admin(), &applicant_id).await.unwrap();

    let err = app.state.approvals.approve(&admin(), &applicant_id).await.unwrap_err();

    match err {
        AppError::InvalidState {
            current, attempted, ..
        } => {
            assert_eq!(current, "REJECTED");
            assert_eq!(attempted, "approve");
        }
        other => panic!("expected InvalidState, got {:?}", other),
    }
    assert_eq!(app.store.student_count().await, 0);
}

#[tokio::test]
async fn test_reject_after_approve_is_refused() {
    let app = TestApp::new();
    let applicant_id = app.submit().await;
    app.state.approvals.approve(&admin(), &applicant_id).await.unwrap();

    let err = app.state.approvals.reject(&admin(), &applicant_id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState { ref current, .. } if current == "APPROVED"));

    let applicant = app.store.find_applicant(&applicant_id).await.unwrap().unwrap();
    assert_eq!(applicant.status, ApplicantStatus::Approved);
}

#[tokio::test]
async fn test_unknown_applicant_is_not_found() {
    let app = TestApp::new();
    let err = app.state.approvals.approve(&admin(), "missing").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_invalid_application_rejected_at_intake() {
    let app = TestApp::new();
    let mut request = application();
    request.email = "not-an-email".to_string();

    let err = app.state.approvals.submit_application(request).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approvals_create_one_student() {
    let app = Arc::new(TestApp::new());
    let applicant_id = app.submit().await;

    let attempts = (0..8).map(|_| {
        let app = app.clone();
        let applicant_id = applicant_id.clone();
        tokio::spawn(async move { app.state.approvals.approve(&admin(), &applicant_id).await })
    });

    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1, "exactly one approval succeeds");
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, AppError::InvalidState { .. })));

    assert_eq!(app.store.student_count().await, 1);
    let applicant = app.store.find_applicant(&applicant_id).await.unwrap().unwrap();
    assert_eq!(applicant.student_id.as_deref(), Some(winners[0].student_id.as_str()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approvals_allocate_distinct_matric_numbers() {
    let app = Arc::new(TestApp::new());
    let mut ids = Vec::new();
    for _ in 0..20 {
        ids.push(app.submit().await);
    }

    let attempts = ids.into_iter().map(|id| {
        let app = app.clone();
        tokio::spawn(async move { app.state.approvals.approve(&admin(), &id).await })
    });

    let matrics: HashSet<String> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked").expect("approve").matric_number)
        .collect();

    assert_eq!(matrics.len(), 20);
    assert!(matrics.contains("HF-0001"));
    assert!(matrics.contains("HF-0020"));
}
