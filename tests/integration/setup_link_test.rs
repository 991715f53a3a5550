// Credential setup links
//
// - Issuing requires payment and supersedes older unredeemed links
// - Links are single use and expire
// - Only the token hash is stored

#[path = "../helpers/mod.rs"]
mod helpers;

use chrono::{Duration, Utc};
use reqwest::Url;

use enrollment_core::core::AppError;
use enrollment_core::modules::credentials::services::{generate_token, hash_token};
use enrollment_core::modules::credentials::{LinkState, SetupLink};
use enrollment_core::modules::enrollment::EnrollmentStore;

use helpers::*;

fn token_from(url: &str) -> String {
    Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned())
        .expect("setup url carries a token")
}

#[tokio::test]
async fn test_reissue_supersedes_previous_link() {
    let app = TestApp::new();
    let student = app.paid().await;

    let first = app
        .state
        .credentials
        .issue_setup_link(&admin(), &student.student_id)
        .await
        .unwrap();
    let second = app
        .state
        .credentials
        .issue_setup_link(&admin(), &student.student_id)
        .await
        .unwrap();
    assert_ne!(first.url, second.url);

    let err = app
        .state
        .credentials
        .redeem_setup_link(&token_from(&first.url))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState { ref current, .. } if current == "superseded"));

    let redeemed = app
        .state
        .credentials
        .redeem_setup_link(&token_from(&second.url))
        .await
        .unwrap();
    assert_eq!(redeemed.student_id, student.student_id);

    let links = app.store.setup_links_for_student(&student.student_id).await;
    assert_eq!(links.len(), 2);
    assert_eq!(links.iter().filter(|l| l.superseded_at.is_some()).count(), 1);
    assert_eq!(links.iter().filter(|l| l.used_at.is_some()).count(), 1);
}

#[tokio::test]
async fn test_link_is_single_use() {
    let app = TestApp::new();
    let student = app.paid().await;
    let issued = app
        .state
        .credentials
        .issue_setup_link(&admin(), &student.student_id)
        .await
        .unwrap();
    let token = token_from(&issued.url);

    app.state.credentials.redeem_setup_link(&token).await.unwrap();
    let err = app.state.credentials.redeem_setup_link(&token).await.unwrap_err();

    assert!(matches!(err, AppError::InvalidState { ref current, .. } if current == "used"));
}

#[tokio::test]
async fn test_token_is_never_persisted() {
    let app = TestApp::new();
    let student = app.paid().await;
    let issued = app
        .state
        .credentials
        .issue_setup_link(&admin(), &student.student_id)
        .await
        .unwrap();
    let token = token_from(&issued.url);

    let links = app.store.setup_links_for_student(&student.student_id).await;
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].token_hash, hash_token(&token));
    assert_ne!(links[0].token_hash, token);
}

#[tokio::test]
async fn test_expired_link_is_refused() {
    let app = TestApp::new();
    let student = app.paid().await;

    let issued_at = Utc::now();
    let token = generate_token();
    let link = SetupLink::new(
        &student.student_id,
        hash_token(&token),
        Duration::hours(72),
        issued_at,
    );
    app.store.issue_setup_link(&link, issued_at).await.unwrap();

    let just_before = issued_at + Duration::hours(72) - Duration::seconds(1);
    assert_eq!(link.state_at(just_before), LinkState::Redeemable);

    let err = app
        .store
        .redeem_setup_link(&hash_token(&token), issued_at + Duration::hours(72))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState { ref current, .. } if current == "expired"));

    // Still unused; expiry does not consume the link
    let links = app.store.setup_links_for_student(&student.student_id).await;
    assert!(links[0].used_at.is_none());
}

#[tokio::test]
async fn test_unpaid_and_unknown_students() {
    let app = TestApp::new();
    let approval = app.approved().await;

    let err = app
        .state
        .credentials
        .issue_setup_link(&admin(), &approval.student_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PaymentRequired(_)));

    let err = app
        .state
        .credentials
        .issue_setup_link(&admin(), "no-such-student")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    assert!(app
        .store
        .setup_links_for_student(&approval.student_id)
        .await
        .is_empty());
}

#[tokio::test]
async fn test_unknown_token_is_not_found() {
    let app = TestApp::new();
    let err = app
        .state
        .credentials
        .redeem_setup_link(&generate_token())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_uppercase_token_still_redeems() {
    let app = TestApp::new();
    let student = app.paid().await;
    let issued = app
        .state
        .credentials
        .issue_setup_link(&admin(), &student.student_id)
        .await
        .unwrap();

    let shouted = token_from(&issued.url).to_ascii_uppercase();
    let redeemed = app.state.credentials.redeem_setup_link(&shouted).await.unwrap();
    assert_eq!(redeemed.student_id, student.student_id);
}

#[tokio::test]
async fn test_oversized_ttl_is_a_configuration_error() {
    let mut settings = enrollment_config();
    settings.setup_link_ttl_hours = i64::MAX;

    let result = enrollment_core::AppState::new(
        std::sync::Arc::new(enrollment_core::modules::enrollment::InMemoryEnrollmentStore::new()),
        std::sync::Arc::new(FakeGateway::new()),
        enrollment_core::modules::payments::PricingRules::flat(
            enrollment_core::core::Currency::NGN,
            BASE_AMOUNT_MINOR,
        ),
        &settings,
    );

    assert!(matches!(result, Err(AppError::Configuration(_))));
}
