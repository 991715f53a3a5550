use crate::core::{Currency, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Payment gateway abstraction used by the payment orchestrator
///
/// Implementations must classify transport failures (timeouts, connection
/// errors, 5xx) as `AppError::GatewayUnavailable` and provider rejections as
/// `AppError::Gateway`, and must never echo the provider's raw body in errors.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a hosted checkout session; never retried automatically
    async fn initialize_charge(&self, request: ChargeRequest) -> Result<ChargeSession>;

    /// Ask the gateway for the authoritative status of a reference
    async fn verify_charge(&self, reference: &str) -> Result<ChargeVerification>;

    /// Check a webhook signature against the raw request body
    fn verify_webhook_signature(&self, signature: &str, payload: &[u8]) -> bool;

    /// Get gateway name
    fn name(&self) -> &str;

    /// Check if gateway supports a currency
    fn supports_currency(&self, currency: Currency) -> bool;
}

/// Checkout request sent to the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// Our unique reference for this attempt
    pub reference: String,

    /// Payer email, required by the gateway
    pub email: String,

    /// Amount in minor units
    pub amount_minor: i64,

    pub currency: Currency,

    /// Where the gateway redirects the payer after checkout
    pub callback_url: Option<String>,

    /// Opaque key/value pairs echoed back by the gateway
    pub metadata: serde_json::Value,
}

/// Hosted checkout session returned by initialize
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeSession {
    pub reference: String,
    pub authorization_url: String,
    pub access_code: Option<String>,
}

/// Gateway-side status of a charge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeStatus {
    Success,
    Failed,
    Pending,
}

/// Authoritative verification result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeVerification {
    pub reference: String,
    pub status: ChargeStatus,

    /// Amount actually charged, in minor units
    pub amount_minor: i64,

    pub currency: Currency,

    /// Payment channel (card, bank, ussd, ...)
    pub channel: Option<String>,

    /// Short provider message, safe to log
    pub gateway_response: Option<String>,
}
