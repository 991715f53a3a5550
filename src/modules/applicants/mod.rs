pub mod controllers;
pub mod models;
pub mod services;

pub use controllers::configure;
pub use models::{Applicant, ApplicantStatus, SubmitApplicationRequest};
pub use services::{ApprovalResult, ApprovalService, EnrollmentDetails};
