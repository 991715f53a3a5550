use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::core::{AppError, RequestIdentity};
use crate::modules::payments::services::{ChargeTarget, InitializePaymentRequest, PaymentService};

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub reference: String,
}

/// POST /payment/initialize
pub async fn initialize_payment(
    service: web::Data<Arc<PaymentService>>,
    identity: RequestIdentity,
    request: web::Json<InitializePaymentRequest>,
) -> Result<HttpResponse, AppError> {
    let target = ChargeTarget::try_from(request.into_inner())?;
    let initiated = service.initiate_charge(&identity, target).await?;
    Ok(HttpResponse::Ok().json(initiated))
}

/// POST /payment/verify
///
/// `already_paid` is a successful verification, not an error.
pub async fn verify_payment(
    service: web::Data<Arc<PaymentService>>,
    identity: RequestIdentity,
    request: web::Json<VerifyPaymentRequest>,
) -> Result<HttpResponse, AppError> {
    let result = service
        .verify_charge(&identity, request.reference.trim())
        .await?;
    Ok(HttpResponse::Ok().json(result))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/payment/initialize", web::post().to(initialize_payment))
        .route("/payment/verify", web::post().to(verify_payment));
}
