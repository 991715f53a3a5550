// Gateway webhook delivery
//
// - Signatures are checked against the raw body
// - The payload reference is re-verified with the gateway before any write
// - Unknown references are acknowledged so the gateway stops redelivering

#[path = "../helpers/mod.rs"]
mod helpers;

use actix_web::{http::StatusCode, test};
use serde_json::{json, Value};

use enrollment_core::modules::enrollment::EnrollmentStore;
use enrollment_core::modules::gateways::services::SIGNATURE_HEADER;
use enrollment_core::modules::payments::controllers::WebhookAck;
use enrollment_core::modules::payments::services::VerificationStatus;

use helpers::*;

fn charge_success(reference: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event": "charge.success",
        "data": {
            "reference": reference,
            "amount": 1,
            "status": "success"
        }
    }))
    .unwrap()
}

#[actix_web::test]
async fn test_signed_success_marks_student_paid() {
    let app = TestApp::new();
    let (approval, reference) = app.with_open_charge().await;
    app.gateway.complete(&reference);
    let service = init_app!(app);

    let body = charge_success(&reference);
    let req = test::TestRequest::post()
        .uri("/webhooks/paystack")
        .insert_header((SIGNATURE_HEADER, FakeGateway::sign(&body)))
        .set_payload(body)
        .to_request();
    let ack: WebhookAck = test::call_and_read_body_json(&service, req).await;

    assert_eq!(
        ack,
        WebhookAck::Processed {
            reference: reference.clone(),
            status: VerificationStatus::Success,
        }
    );
    let student = app.store.find_student(&approval.student_id).await.unwrap().unwrap();
    assert!(student.is_paid);
}

#[actix_web::test]
async fn test_redelivery_is_idempotent() {
    let app = TestApp::new();
    let (_, reference) = app.with_open_charge().await;
    app.gateway.complete(&reference);
    let service = init_app!(app);

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let body = charge_success(&reference);
        let req = test::TestRequest::post()
            .uri("/webhooks/paystack")
            .insert_header((SIGNATURE_HEADER, FakeGateway::sign(&body)))
            .set_payload(body)
            .to_request();
        let ack: WebhookAck = test::call_and_read_body_json(&service, req).await;
        match ack {
            WebhookAck::Processed { status, .. } => statuses.push(status),
            other => panic!("unexpected ack {:?}", other),
        }
    }

    assert_eq!(
        statuses,
        vec![
            VerificationStatus::Success,
            VerificationStatus::AlreadyPaid,
            VerificationStatus::AlreadyPaid
        ]
    );
}

#[actix_web::test]
async fn test_payload_claims_are_not_trusted() {
    let app = TestApp::new();
    let (approval, reference) = app.with_open_charge().await;
    // Gateway still reports the charge as pending
    let service = init_app!(app);

    let body = charge_success(&reference);
    let req = test::TestRequest::post()
        .uri("/webhooks/paystack")
        .insert_header((SIGNATURE_HEADER, FakeGateway::sign(&body)))
        .set_payload(body)
        .to_request();
    let ack: WebhookAck = test::call_and_read_body_json(&service, req).await;

    assert!(matches!(
        ack,
        WebhookAck::Processed {
            status: VerificationStatus::Pending,
            ..
        }
    ));
    let student = app.store.find_student(&approval.student_id).await.unwrap().unwrap();
    assert!(!student.is_paid);
}

#[actix_web::test]
async fn test_bad_signature_is_unauthorized() {
    let app = TestApp::new();
    let (_, reference) = app.with_open_charge().await;
    app.gateway.complete(&reference);
    let service = init_app!(app);

    let body = charge_success(&reference);
    let forged = FakeGateway::sign(b"some other body");
    let req = test::TestRequest::post()
        .uri("/webhooks/paystack")
        .insert_header((SIGNATURE_HEADER, forged))
        .set_payload(body.clone())
        .to_request();
    let resp = test::call_service(&service, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/webhooks/paystack")
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&service, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(app.gateway.verify_calls(), 0);
}

#[actix_web::test]
async fn test_unknown_reference_and_other_events_are_acknowledged() {
    let app = TestApp::new();
    let service = init_app!(app);

    let body = charge_success("enr_unknown");
    let req = test::TestRequest::post()
        .uri("/webhooks/paystack")
        .insert_header((SIGNATURE_HEADER, FakeGateway::sign(&body)))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&service, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let ack: Value = test::read_body_json(resp).await;
    assert_eq!(ack["result"], "ignored");

    let body = serde_json::to_vec(&json!({
        "event": "transfer.success",
        "data": { "reference": "trf_1" }
    }))
    .unwrap();
    let req = test::TestRequest::post()
        .uri("/webhooks/paystack")
        .insert_header((SIGNATURE_HEADER, FakeGateway::sign(&body)))
        .set_payload(body)
        .to_request();
    let ack: Value = test::call_and_read_body_json(&service, req).await;
    assert_eq!(ack["result"], "ignored");
}

#[actix_web::test]
async fn test_gateway_outage_asks_for_redelivery() {
    let app = TestApp::new();
    let (approval, reference) = app.with_open_charge().await;
    app.gateway.complete(&reference);
    app.gateway.set_unavailable(true);
    let service = init_app!(app);

    let body = charge_success(&reference);
    let req = test::TestRequest::post()
        .uri("/webhooks/paystack")
        .insert_header((SIGNATURE_HEADER, FakeGateway::sign(&body)))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&service, req).await;

    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let student = app.store.find_student(&approval.student_id).await.unwrap().unwrap();
    assert!(!student.is_paid);
}
