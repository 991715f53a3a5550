// Repair of broken Applicant -> Student links
//
// Broken links are planted directly in the store to reproduce what a crash
// between approval steps, or a partial import, leaves behind.

#[path = "../helpers/mod.rs"]
mod helpers;

use chrono::{Duration, Utc};

use enrollment_core::core::AppError;
use enrollment_core::modules::applicants::{Applicant, ApplicantStatus};
use enrollment_core::modules::enrollment::EnrollmentStore;
use enrollment_core::modules::students::Student;

use helpers::*;

/// An APPROVED applicant whose link was never written
async fn plant_unlinked_applicant(app: &TestApp) -> Applicant {
    let mut applicant = Applicant::new(application(), Utc::now() - Duration::days(2)).unwrap();
    applicant.status = ApplicantStatus::Approved;
    applicant.reviewed_by = Some("admin-1".to_string());
    applicant.reviewed_at = Some(Utc::now() - Duration::days(1));
    applicant.student_id = None;
    app.store.put_applicant(applicant.clone()).await;
    applicant
}

#[tokio::test]
async fn test_crash_window_relinks_orphan_without_new_matric() {
    let app = TestApp::new();
    let applicant = plant_unlinked_applicant(&app).await;
    let orphan = Student::for_applicant(&applicant, "HF-0001".to_string(), Utc::now());
    app.store.put_student(orphan.clone()).await;

    assert!(app.state.repairs.detect_broken_link(&applicant.id).await.unwrap());
    let details = app.state.approvals.details(&admin(), &applicant.id).await.unwrap();
    assert!(details.needs_repair);

    let repaired = app.state.repairs.repair(&admin(), &applicant.id).await.unwrap();

    assert!(repaired.relinked_existing);
    assert_eq!(repaired.student_id, orphan.id);
    assert_eq!(repaired.matric_number, "HF-0001");
    assert_eq!(app.store.student_count().await, 1);

    let linked = app.store.find_linked_student(&applicant.id).await.unwrap().unwrap();
    assert_eq!(linked.id, orphan.id);
    assert!(!app.state.repairs.detect_broken_link(&applicant.id).await.unwrap());
}

#[tokio::test]
async fn test_orphan_matched_by_email_when_back_reference_missing() {
    let app = TestApp::new();
    let applicant = plant_unlinked_applicant(&app).await;
    let mut orphan = Student::for_applicant(&applicant, "HF-0009".to_string(), Utc::now());
    orphan.applicant_id = None;
    orphan.email = applicant.email.to_uppercase();
    app.store.put_student(orphan.clone()).await;

    let repaired = app.state.repairs.repair(&admin(), &applicant.id).await.unwrap();

    assert!(repaired.relinked_existing);
    assert_eq!(repaired.student_id, orphan.id);
    let student = app.store.find_student(&orphan.id).await.unwrap().unwrap();
    assert_eq!(student.applicant_id.as_deref(), Some(applicant.id.as_str()));
}

#[tokio::test]
async fn test_dangling_link_mints_fresh_student() {
    let app = TestApp::new();
    // An unrelated approval holds HF-0001
    app.approved().await;

    let mut applicant = plant_unlinked_applicant(&app).await;
    applicant.student_id = Some("deleted-student".to_string());
    app.store.put_applicant(applicant.clone()).await;

    let repaired = app.state.repairs.repair(&admin(), &applicant.id).await.unwrap();

    assert!(!repaired.relinked_existing);
    assert_eq!(repaired.matric_number, "HF-0002");
    assert_eq!(app.store.student_count().await, 2);

    let student = app.store.find_student(&repaired.student_id).await.unwrap().unwrap();
    assert_eq!(student.email, applicant.email);
    assert_eq!(student.applied_at, applicant.created_at);
    assert!(!student.is_paid);
}

#[tokio::test]
async fn test_student_claimed_by_another_applicant_is_not_taken() {
    let app = TestApp::new();
    let applicant = plant_unlinked_applicant(&app).await;

    // Same email, but already linked to a different applicant
    let mut other = Applicant::new(application(), Utc::now()).unwrap();
    other.email = applicant.email.clone();
    let mut claimed = Student::for_applicant(&other, "HF-0005".to_string(), Utc::now());
    claimed.applicant_id = None;
    other.status = ApplicantStatus::Approved;
    other.student_id = Some(claimed.id.clone());
    app.store.put_applicant(other).await;
    app.store.put_student(claimed.clone()).await;

    let repaired = app.state.repairs.repair(&admin(), &applicant.id).await.unwrap();

    assert!(!repaired.relinked_existing);
    assert_ne!(repaired.student_id, claimed.id);
    assert_ne!(repaired.matric_number, "HF-0005");
}

#[tokio::test]
async fn test_repair_of_healthy_link_is_invalid_state() {
    let app = TestApp::new();
    let approval = app.approved().await;

    let err = app
        .state
        .repairs
        .repair(&admin(), &approval.applicant_id)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidState { .. }));
    assert_eq!(app.store.student_count().await, 1);
}

#[tokio::test]
async fn test_repair_of_pending_applicant_is_invalid_state() {
    let app = TestApp::new();
    let applicant_id = app.submit().await;

    let err = app.state.repairs.repair(&admin(), &applicant_id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState { ref current, .. } if current == "PENDING"));
    assert!(!app.state.repairs.detect_broken_link(&applicant_id).await.unwrap());
}

#[tokio::test]
async fn test_blank_applicant_id_is_rejected_before_store_access() {
    let app = TestApp::new();

    for id in ["", "   "] {
        let err = app.state.repairs.repair(&admin(), id).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "repair({:?}) gave {:?}", id, err);

        let err = app.state.repairs.detect_broken_link(id).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}

#[tokio::test]
async fn test_padded_applicant_id_is_trimmed() {
    let app = TestApp::new();
    let applicant = plant_unlinked_applicant(&app).await;
    let padded = format!("  {}\n", applicant.id);

    assert!(app.state.repairs.detect_broken_link(&padded).await.unwrap());
    let repaired = app.state.repairs.repair(&admin(), &padded).await.unwrap();
    assert_eq!(repaired.applicant_id, applicant.id);
}
