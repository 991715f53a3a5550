use actix_web::web;

pub mod applicants;
pub mod credentials;
pub mod enrollment;
pub mod gateways;
pub mod health;
pub mod payments;
pub mod reconciliation;
pub mod students;

/// Mount point of the enrollment API
pub const API_PREFIX: &str = "/api/enrollment";

/// Routes served under [`API_PREFIX`]
pub fn configure_enrollment(cfg: &mut web::ServiceConfig) {
    cfg.configure(applicants::configure)
        .configure(payments::configure)
        .configure(credentials::configure)
        .configure(reconciliation::configure);
}

/// Unscoped routes: gateway callbacks and probes
pub fn configure_public(cfg: &mut web::ServiceConfig) {
    cfg.configure(payments::configure_webhooks)
        .configure(health::configure);
}
