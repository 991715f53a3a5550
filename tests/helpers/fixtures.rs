// Test data and service wiring
//
// `TestApp` builds the full service graph over an in-memory store and a
// `FakeGateway`, mirroring what `main` assembles for production.

use std::sync::Arc;

use uuid::Uuid;

use enrollment_core::config::EnrollmentConfig;
use enrollment_core::core::{ActorRole, Currency, RequestIdentity};
use enrollment_core::modules::applicants::{ApprovalResult, SubmitApplicationRequest};
use enrollment_core::modules::enrollment::{EnrollmentStore, InMemoryEnrollmentStore};
use enrollment_core::modules::gateways::PaymentGateway;
use enrollment_core::modules::payments::services::ChargeTarget;
use enrollment_core::modules::payments::PricingRules;
use enrollment_core::AppState;

use super::fake_gateway::FakeGateway;

pub const BASE_AMOUNT_MINOR: i64 = 15_000;
pub const SETUP_BASE_URL: &str = "https://lms.example.org/account/setup";

pub fn admin() -> RequestIdentity {
    RequestIdentity::new("admin-1", ActorRole::Admin)
}

pub fn staff() -> RequestIdentity {
    RequestIdentity::new("staff-7", ActorRole::Staff)
}

/// Unique applicant payload
pub fn application() -> SubmitApplicationRequest {
    application_with_cohort(None)
}

pub fn application_with_cohort(cohort: Option<&str>) -> SubmitApplicationRequest {
    let tag = Uuid::new_v4().simple().to_string();
    SubmitApplicationRequest {
        full_name: format!("Test Learner {}", &tag[..6]),
        email: format!("learner-{}@example.org", tag),
        phone: "08030000000".to_string(),
        cohort: cohort.map(str::to_string),
    }
}

pub fn enrollment_config() -> EnrollmentConfig {
    EnrollmentConfig {
        payment_callback_url: Some("https://lms.example.org/payment/complete".to_string()),
        matric_prefix: "HF".to_string(),
        matric_width: 4,
        setup_link_base_url: SETUP_BASE_URL.to_string(),
        setup_link_ttl_hours: 72,
        pricing_rules_path: "config/pricing.yaml".to_string(),
    }
}

pub struct TestApp {
    pub store: Arc<InMemoryEnrollmentStore>,
    pub gateway: Arc<FakeGateway>,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_rules(PricingRules::flat(Currency::NGN, BASE_AMOUNT_MINOR))
    }

    pub fn with_rules(rules: PricingRules) -> Self {
        let store = Arc::new(InMemoryEnrollmentStore::new());
        let gateway = Arc::new(FakeGateway::new());

        let state = AppState::new(
            store.clone() as Arc<dyn EnrollmentStore>,
            gateway.clone() as Arc<dyn PaymentGateway>,
            rules,
            &enrollment_config(),
        )
        .expect("test app state");

        Self {
            store,
            gateway,
            state,
        }
    }

    pub async fn submit(&self) -> String {
        submit_via(&self.state).await
    }

    pub async fn approved(&self) -> ApprovalResult {
        approve_via(&self.state).await
    }

    /// Open a checkout for a freshly approved student; returns (approval, reference)
    pub async fn with_open_charge(&self) -> (ApprovalResult, String) {
        open_charge_via(&self.state).await
    }

    /// A student whose payment has been verified
    pub async fn paid(&self) -> ApprovalResult {
        pay_via(&self.state, &self.gateway).await
    }
}

// Scenario steps shared by the in-memory and MySQL harnesses

pub async fn submit_via(state: &AppState) -> String {
    state
        .approvals
        .submit_application(application())
        .await
        .expect("submit application")
        .id
}

pub async fn approve_via(state: &AppState) -> ApprovalResult {
    let applicant_id = submit_via(state).await;
    state
        .approvals
        .approve(&admin(), &applicant_id)
        .await
        .expect("approve applicant")
}

pub async fn open_charge_via(state: &AppState) -> (ApprovalResult, String) {
    let approval = approve_via(state).await;
    let initiated = state
        .payments
        .initiate_charge(&staff(), ChargeTarget::Student(approval.student_id.clone()))
        .await
        .expect("initiate charge");
    (approval, initiated.reference)
}

pub async fn pay_via(state: &AppState, gateway: &FakeGateway) -> ApprovalResult {
    let (approval, reference) = open_charge_via(state).await;
    gateway.complete(&reference);
    let result = state
        .payments
        .verify_charge(&staff(), &reference)
        .await
        .expect("verify charge");
    assert!(result.is_paid);
    approval
}

/// Build an `actix_web::test` service exposing every route over a `TestApp`
#[macro_export]
macro_rules! init_app {
    ($app:expr) => {{
        let state = $app.state.clone();
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap(enrollment_core::middleware::RequestId)
                .configure(move |cfg| state.register(cfg))
                .service(
                    actix_web::web::scope(enrollment_core::API_PREFIX)
                        .configure(enrollment_core::configure_enrollment),
                )
                .configure(enrollment_core::configure_public),
        )
        .await
    }};
}
