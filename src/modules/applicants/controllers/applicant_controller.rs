use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::core::{AppError, RequestIdentity};
use crate::modules::applicants::models::{ApplicantStatus, SubmitApplicationRequest};
use crate::modules::applicants::services::ApprovalService;

/// Body shared by approve and reject
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicantIdRequest {
    pub applicant_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectResponse {
    pub applicant_id: String,
    pub status: ApplicantStatus,
}

/// POST /applicants
pub async fn submit_application(
    service: web::Data<Arc<ApprovalService>>,
    request: web::Json<SubmitApplicationRequest>,
) -> Result<HttpResponse, AppError> {
    let applicant = service.submit_application(request.into_inner()).await?;
    Ok(HttpResponse::Created().json(applicant))
}

/// POST /approve
pub async fn approve(
    service: web::Data<Arc<ApprovalService>>,
    identity: RequestIdentity,
    request: web::Json<ApplicantIdRequest>,
) -> Result<HttpResponse, AppError> {
    let result = service.approve(&identity, &request.applicant_id).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// POST /reject
pub async fn reject(
    service: web::Data<Arc<ApprovalService>>,
    identity: RequestIdentity,
    request: web::Json<ApplicantIdRequest>,
) -> Result<HttpResponse, AppError> {
    let applicant = service.reject(&identity, &request.applicant_id).await?;
    Ok(HttpResponse::Ok().json(RejectResponse {
        applicant_id: applicant.id,
        status: applicant.status,
    }))
}

/// GET /details/{applicant_id}
pub async fn details(
    service: web::Data<Arc<ApprovalService>>,
    identity: RequestIdentity,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let details = service.details(&identity, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(details))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/applicants", web::post().to(submit_application))
        .route("/approve", web::post().to(approve))
        .route("/reject", web::post().to(reject))
        .route("/details/{applicant_id}", web::get().to(details));
}
