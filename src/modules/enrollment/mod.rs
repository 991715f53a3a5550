//! Persistence for the enrollment pipeline
//!
//! Applicants, students, payments and setup links share one store so that
//! cross-record invariants hold inside a single transaction.

pub mod repositories;

pub use repositories::{
    EnrollmentStore, InMemoryEnrollmentStore, IssuedLink, MySqlEnrollmentStore, RejectOutcome,
    RepairOutcome, Settlement, SettlementOutcome,
};
