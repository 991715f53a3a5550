pub mod controllers;
pub mod models;
pub mod services;

pub use controllers::configure;
pub use models::{LinkState, SetupLink};
pub use services::{CredentialIssuer, IssuedSetupLink, RedeemedSetupLink};
