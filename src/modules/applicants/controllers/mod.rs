pub mod applicant_controller;

pub use applicant_controller::configure;
