pub mod services;

pub use services::{
    ChargeRequest, ChargeSession, ChargeStatus, ChargeVerification, PaymentGateway, PaystackClient,
    PaystackConfig,
};
