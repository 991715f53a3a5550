pub mod payment_service;
pub mod pricing;

pub use payment_service::{
    ChargeInitiated, ChargeTarget, DECLINED_BY_GATEWAY, InitializePaymentRequest, PaymentService, VerificationResult,
    VerificationStatus,
};
pub use pricing::{DiscountRule, DiscountWindow, PricingEngine, PricingRules, PricingSubject, Quote};
