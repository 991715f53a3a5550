use std::sync::Arc;

use actix_web::web;

use crate::config::EnrollmentConfig;
use crate::core::Result;
use crate::middleware::json_error_handler;
use crate::modules::applicants::ApprovalService;
use crate::modules::credentials::CredentialIssuer;
use crate::modules::enrollment::EnrollmentStore;
use crate::modules::gateways::PaymentGateway;
use crate::modules::payments::{PaymentService, PricingEngine, PricingRules};
use crate::modules::reconciliation::RepairService;
use crate::modules::students::{MatricNumberFormat, PrefixedSequence};

/// Shared services handed to every worker
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EnrollmentStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub approvals: Arc<ApprovalService>,
    pub payments: Arc<PaymentService>,
    pub credentials: Arc<CredentialIssuer>,
    pub repairs: Arc<RepairService>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn EnrollmentStore>,
        gateway: Arc<dyn PaymentGateway>,
        pricing: PricingRules,
        settings: &EnrollmentConfig,
    ) -> Result<Self> {
        pricing.validate()?;

        let matric: Arc<dyn MatricNumberFormat> = Arc::new(PrefixedSequence::new(
            settings.matric_prefix.clone(),
            settings.matric_width,
        ));

        let credentials = CredentialIssuer::new(
            store.clone(),
            &settings.setup_link_base_url,
            settings.setup_link_ttl()?,
        )?;

        Ok(Self {
            approvals: Arc::new(ApprovalService::new(store.clone(), matric.clone())),
            payments: Arc::new(PaymentService::new(
                store.clone(),
                gateway.clone(),
                Arc::new(PricingEngine::new(pricing)),
                settings.payment_callback_url.clone(),
            )),
            credentials: Arc::new(credentials),
            repairs: Arc::new(RepairService::new(store.clone(), matric)),
            store,
            gateway,
        })
    }

    /// Register shared state and extractor configuration on an app
    pub fn register(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::new(self.store.clone()))
            .app_data(web::Data::new(self.gateway.clone()))
            .app_data(web::Data::new(self.approvals.clone()))
            .app_data(web::Data::new(self.payments.clone()))
            .app_data(web::Data::new(self.credentials.clone()))
            .app_data(web::Data::new(self.repairs.clone()))
            .app_data(web::JsonConfig::default().error_handler(json_error_handler));
    }
}
