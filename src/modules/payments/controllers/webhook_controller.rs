use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::core::{AppError, RequestIdentity};
use crate::modules::gateways::services::SIGNATURE_HEADER;
use crate::modules::gateways::PaymentGateway;
use crate::modules::payments::services::{PaymentService, VerificationStatus};

const CHARGE_SUCCESS: &str = "charge.success";

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    reference: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum WebhookAck {
    Processed {
        reference: String,
        status: VerificationStatus,
    },
    Ignored {
        reason: String,
    },
}

/// POST /webhooks/paystack
///
/// The payload is only a hint: the reference is re-verified with the gateway
/// before anything is written. Returns 503 on gateway outages so the
/// provider redelivers.
pub async fn paystack_webhook(
    req: HttpRequest,
    body: web::Bytes,
    gateway: web::Data<Arc<dyn PaymentGateway>>,
    payments: web::Data<Arc<PaymentService>>,
) -> Result<HttpResponse, AppError> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::unauthorized("Missing webhook signature"))?;

    if !gateway.verify_webhook_signature(signature, &body) {
        tracing::warn!(gateway = gateway.name(), "Webhook signature mismatch");
        return Err(AppError::unauthorized("Invalid webhook signature"));
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::validation(format!("Invalid webhook payload: {}", e)))?;

    if event.event != CHARGE_SUCCESS {
        tracing::debug!(event = %event.event, "Ignoring webhook event");
        return Ok(HttpResponse::Ok().json(WebhookAck::Ignored {
            reason: format!("event '{}' not handled", event.event),
        }));
    }

    let identity = RequestIdentity::system(gateway.name());
    let reference = event.data.reference;

    match payments.verify_charge(&identity, &reference).await {
        Ok(result) => Ok(HttpResponse::Ok().json(WebhookAck::Processed {
            reference: result.reference,
            status: result.status,
        })),
        Err(AppError::NotFound(_)) | Err(AppError::Validation(_)) => {
            tracing::warn!(%reference, "Webhook for unknown reference acknowledged");
            Ok(HttpResponse::Ok().json(WebhookAck::Ignored {
                reason: "unknown reference".to_string(),
            }))
        }
        Err(e) => Err(e),
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/webhooks/paystack", web::post().to(paystack_webhook));
}
