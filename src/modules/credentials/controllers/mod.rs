pub mod credential_controller;

pub use credential_controller::configure;
