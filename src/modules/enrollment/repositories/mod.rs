pub mod enrollment_store;
pub mod in_memory_store;
pub mod mysql_store;

pub use enrollment_store::{
    EnrollmentStore, IssuedLink, RejectOutcome, RepairOutcome, Settlement, SettlementOutcome,
};
pub use in_memory_store::InMemoryEnrollmentStore;
pub use mysql_store::MySqlEnrollmentStore;
