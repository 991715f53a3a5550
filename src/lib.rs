//! Enrollment pipeline for the counseling-training LMS
//!
//! Applicant approval, pricing, payment collection through a hosted-checkout
//! gateway, credential setup links and repair of broken applicant links.

pub mod config;
pub mod core;
pub mod middleware;
pub mod modules;
pub mod state;

pub use modules::{configure_enrollment, configure_public, API_PREFIX};
pub use state::AppState;
