pub mod repair_controller;

pub use repair_controller::configure;
