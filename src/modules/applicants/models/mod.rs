pub mod applicant;

pub use applicant::{Applicant, ApplicantStatus, SubmitApplicationRequest};
