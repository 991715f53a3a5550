pub mod repair_service;

pub use repair_service::{link_is_broken, RepairResult, RepairService};
