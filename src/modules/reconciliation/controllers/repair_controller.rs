use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::core::{AppError, RequestIdentity};
use crate::modules::reconciliation::services::RepairService;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairLinkRequest {
    pub applicant_id: String,
}

/// POST /repair-link
pub async fn repair_link(
    service: web::Data<Arc<RepairService>>,
    identity: RequestIdentity,
    request: web::Json<RepairLinkRequest>,
) -> Result<HttpResponse, AppError> {
    let applicant_id = request.applicant_id.trim();
    if applicant_id.is_empty() {
        return Err(AppError::validation("applicantId is required"));
    }

    let result = service.repair(&identity, applicant_id).await?;
    Ok(HttpResponse::Ok().json(result))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/repair-link", web::post().to(repair_link));
}
