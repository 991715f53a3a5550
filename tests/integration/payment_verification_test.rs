// Payment verification: idempotency, concurrency and tamper handling
//
// - Repeated and concurrent verification settles a student at most once
// - A success whose amount or currency differs from the quote is recorded as failed
// - Gateway outages leave every record untouched

#[path = "../helpers/mod.rs"]
mod helpers;

use std::sync::Arc;

use futures_util::future::join_all;

use enrollment_core::core::{AppError, Currency};
use enrollment_core::modules::enrollment::EnrollmentStore;
use enrollment_core::modules::payments::services::{
    ChargeTarget, VerificationStatus, DECLINED_BY_GATEWAY,
};
use enrollment_core::modules::payments::PaymentStatus;

use helpers::*;

#[tokio::test]
async fn test_verify_is_idempotent() {
    let app = TestApp::new();
    let (approval, reference) = app.with_open_charge().await;
    app.gateway.complete(&reference);

    let first = app.state.payments.verify_charge(&staff(), &reference).await.unwrap();
    assert_eq!(first.status, VerificationStatus::Success);
    let calls_after_first = app.gateway.verify_calls();

    let second = app.state.payments.verify_charge(&staff(), &reference).await.unwrap();
    assert_eq!(second.status, VerificationStatus::AlreadyPaid);
    assert!(second.is_paid);
    assert_eq!(second.paid_at, first.paid_at, "paid_at is written once");
    assert_eq!(app.gateway.verify_calls(), calls_after_first, "no gateway call once paid");

    let student = app.store.find_student(&approval.student_id).await.unwrap().unwrap();
    assert_eq!(student.paid_at, first.paid_at);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_verify_of_one_reference() {
    let app = Arc::new(TestApp::new());
    let (approval, reference) = app.with_open_charge().await;
    app.gateway.complete(&reference);

    let calls = (0..10).map(|_| {
        let app = app.clone();
        let reference = reference.clone();
        tokio::spawn(async move { app.state.payments.verify_charge(&staff(), &reference).await })
    });

    for joined in join_all(calls).await {
        let result = joined.expect("task panicked").expect("verify");
        assert!(result.is_paid);
        assert!(matches!(
            result.status,
            VerificationStatus::Success | VerificationStatus::AlreadyPaid
        ));
    }

    let payments = app
        .store
        .list_payments_for_student(&approval.student_id)
        .await
        .unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Success);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_successful_attempts_pay_once() {
    let app = Arc::new(TestApp::new());
    let approval = app.approved().await;

    let mut references = Vec::new();
    for _ in 0..2 {
        let initiated = app
            .state
            .payments
            .initiate_charge(&staff(), ChargeTarget::Student(approval.student_id.clone()))
            .await
            .unwrap();
        app.gateway.complete(&initiated.reference);
        references.push(initiated.reference);
    }

    let calls = references.iter().cloned().map(|reference| {
        let app = app.clone();
        tokio::spawn(async move { app.state.payments.verify_charge(&staff(), &reference).await })
    });
    let results: Vec<_> = join_all(calls)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked").expect("verify"))
        .collect();

    assert_eq!(
        results
            .iter()
            .filter(|r| r.status == VerificationStatus::Success)
            .count(),
        1
    );
    assert!(results.iter().all(|r| r.is_paid));

    let payments = app
        .store
        .list_payments_for_student(&approval.student_id)
        .await
        .unwrap();
    assert_eq!(
        payments.iter().filter(|p| p.status == PaymentStatus::Success).count(),
        1,
        "at most one successful payment per student"
    );
    assert_eq!(
        payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Superseded)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_amount_tamper_is_recorded_as_failed() {
    let app = TestApp::new();
    let (approval, reference) = app.with_open_charge().await;
    app.gateway.complete_with_amount(&reference, 1_500);

    let result = app.state.payments.verify_charge(&staff(), &reference).await.unwrap();

    assert_eq!(result.status, VerificationStatus::Failed);
    assert!(!result.is_paid);
    assert!(result
        .failure_reason
        .as_deref()
        .unwrap()
        .starts_with("Amount mismatch"));

    let student = app.store.find_student(&approval.student_id).await.unwrap().unwrap();
    assert!(!student.is_paid);
    let payment = app
        .store
        .find_payment_by_reference(&reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(payment.gateway_amount_minor, Some(1_500));
}

#[tokio::test]
async fn test_currency_tamper_is_recorded_as_failed() {
    let app = TestApp::new();
    let (_, reference) = app.with_open_charge().await;
    app.gateway.complete_with_currency(&reference, Currency::GHS);

    let result = app.state.payments.verify_charge(&staff(), &reference).await.unwrap();
    assert_eq!(result.status, VerificationStatus::Failed);
    assert!(!result.is_paid);
}

#[tokio::test]
async fn test_gateway_outage_leaves_state_untouched() {
    let app = TestApp::new();
    let (approval, reference) = app.with_open_charge().await;
    app.gateway.complete(&reference);
    app.gateway.set_unavailable(true);

    let err = app
        .state
        .payments
        .verify_charge(&staff(), &reference)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::GatewayUnavailable(_)));

    let payment = app
        .store
        .find_payment_by_reference(&reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    let student = app.store.find_student(&approval.student_id).await.unwrap().unwrap();
    assert!(!student.is_paid);

    // Retrying once the gateway is back settles normally
    app.gateway.set_unavailable(false);
    let result = app.state.payments.verify_charge(&staff(), &reference).await.unwrap();
    assert_eq!(result.status, VerificationStatus::Success);
}

#[tokio::test]
async fn test_pending_at_gateway_writes_nothing() {
    let app = TestApp::new();
    let (_, reference) = app.with_open_charge().await;

    let result = app.state.payments.verify_charge(&staff(), &reference).await.unwrap();
    assert_eq!(result.status, VerificationStatus::Pending);
    assert!(!result.is_paid);

    let payment = app
        .store
        .find_payment_by_reference(&reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert!(payment.verified_at.is_none());
}

#[tokio::test]
async fn test_failed_attempt_allows_a_new_charge() {
    let app = TestApp::new();
    let (approval, reference) = app.with_open_charge().await;
    app.gateway.fail(&reference);

    let failed = app.state.payments.verify_charge(&staff(), &reference).await.unwrap();
    assert_eq!(failed.status, VerificationStatus::Failed);
    // Provider wording is not echoed back or persisted
    assert_eq!(failed.failure_reason.as_deref(), Some(DECLINED_BY_GATEWAY));
    let stored = app
        .store
        .find_payment_by_reference(&reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.failure_reason.as_deref(), Some(DECLINED_BY_GATEWAY));

    // Re-verifying a settled failure does not call the gateway again
    let calls = app.gateway.verify_calls();
    let again = app.state.payments.verify_charge(&staff(), &reference).await.unwrap();
    assert_eq!(again.status, VerificationStatus::Failed);
    assert_eq!(app.gateway.verify_calls(), calls);

    let retry = app
        .state
        .payments
        .initiate_charge(&staff(), ChargeTarget::Student(approval.student_id.clone()))
        .await
        .unwrap();
    app.gateway.complete(&retry.reference);
    let paid = app
        .state
        .payments
        .verify_charge(&staff(), &retry.reference)
        .await
        .unwrap();
    assert_eq!(paid.status, VerificationStatus::Success);
}

#[tokio::test]
async fn test_unknown_and_malformed_references() {
    let app = TestApp::new();

    let err = app
        .state
        .payments
        .verify_charge(&staff(), "enr_doesnotexist")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = app
        .state
        .payments
        .verify_charge(&staff(), "bad reference!")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    assert_eq!(app.gateway.verify_calls(), 0);
}
