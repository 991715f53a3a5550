pub mod controllers;
pub mod models;
pub mod services;

pub use controllers::{configure, configure_webhooks};
pub use models::{Payment, PaymentStatus};
pub use services::{PaymentService, PricingEngine, PricingRules};
