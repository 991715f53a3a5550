use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::core::{AppError, RequestIdentity};
use crate::modules::credentials::services::CredentialIssuer;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueSetupLinkRequest {
    pub student_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RedeemSetupLinkRequest {
    pub token: String,
}

/// POST /credential/setup-link
pub async fn issue_setup_link(
    issuer: web::Data<Arc<CredentialIssuer>>,
    identity: RequestIdentity,
    request: web::Json<IssueSetupLinkRequest>,
) -> Result<HttpResponse, AppError> {
    let issued = issuer
        .issue_setup_link(&identity, &request.student_id)
        .await?;
    Ok(HttpResponse::Ok().json(issued))
}

/// POST /credential/redeem
///
/// Called by the auth subsystem with the token from the link; no staff identity.
pub async fn redeem_setup_link(
    issuer: web::Data<Arc<CredentialIssuer>>,
    request: web::Json<RedeemSetupLinkRequest>,
) -> Result<HttpResponse, AppError> {
    let redeemed = issuer.redeem_setup_link(&request.token).await?;
    Ok(HttpResponse::Ok().json(redeemed))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/credential/setup-link", web::post().to(issue_setup_link))
        .route("/credential/redeem", web::post().to(redeem_setup_link));
}
