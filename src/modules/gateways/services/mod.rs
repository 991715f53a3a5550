pub mod gateway_trait;
pub mod paystack;

pub use gateway_trait::{
    ChargeRequest, ChargeSession, ChargeStatus, ChargeVerification, PaymentGateway,
};
pub use paystack::{sign_payload, PaystackClient, PaystackConfig, SIGNATURE_HEADER};
