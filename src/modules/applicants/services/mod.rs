pub mod approval_service;

pub use approval_service::{ApprovalResult, ApprovalService, EnrollmentDetails};
