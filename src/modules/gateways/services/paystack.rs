use super::gateway_trait::{
    ChargeRequest, ChargeSession, ChargeStatus, ChargeVerification, PaymentGateway,
};
use crate::core::{AppError, Currency, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha512;
use std::str::FromStr;
use std::time::Duration;

type HmacSha512 = Hmac<Sha512>;

/// Header carrying the webhook HMAC
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Connection settings for a Paystack-compatible gateway
#[derive(Debug, Clone)]
pub struct PaystackConfig {
    pub secret_key: String,
    pub base_url: String,
    pub timeout: Duration,
    /// Extra attempts for verify on transient failures
    pub verify_retries: u32,
}

/// Paystack payment gateway client
///
/// API Documentation: https://paystack.com/docs/api/transaction/
pub struct PaystackClient {
    client: Client,
    retrying_client: ClientWithMiddleware,
    secret_key: String,
    base_url: Url,
}

/// Every Paystack response is wrapped in this envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Serialize)]
struct InitializeBody<'a> {
    email: &'a str,
    amount: i64,
    currency: String,
    reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
    metadata: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    #[serde(default)]
    access_code: Option<String>,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    reference: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    gateway_response: Option<String>,
}

impl PaystackClient {
    pub fn new(config: PaystackConfig) -> Result<Self> {
        if config.secret_key.trim().is_empty() {
            return Err(AppError::Configuration(
                "Paystack secret key is required".to_string(),
            ));
        }

        let mut base_url = Url::parse(&config.base_url).map_err(|e| {
            AppError::Configuration(format!("Invalid Paystack base URL: {}", e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Configuration(
                "Paystack base URL must be absolute".to_string(),
            ));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.verify_retries);
        let retrying_client = ClientBuilder::new(client.clone())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            retrying_client,
            secret_key: config.secret_key,
            base_url,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Configuration("Paystack base URL must be absolute".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Read the response and unwrap the envelope, mapping HTTP failures onto the taxonomy
    async fn read_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
        operation: &str,
    ) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(operation, &e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
                .map(|e| e.message)
                .unwrap_or_default();
            tracing::warn!(
                gateway = "paystack",
                operation,
                http_status = status.as_u16(),
                provider_message = %message,
                "Gateway returned an error status"
            );
            return Err(classify_status(status, operation));
        }

        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(gateway = "paystack", operation, error = %e, "Unparseable gateway response");
            AppError::gateway(format!("Paystack {} returned an unreadable response", operation))
        })?;

        if !envelope.status {
            tracing::warn!(
                gateway = "paystack",
                operation,
                provider_message = %envelope.message,
                "Gateway refused the request"
            );
            return Err(AppError::gateway(format!("Paystack refused {}", operation)));
        }

        envelope
            .data
            .ok_or_else(|| AppError::gateway(format!("Paystack {} response had no data", operation)))
    }
}

/// 5xx and 429 are transient; any other non-success status is a rejection
fn classify_status(status: StatusCode, operation: &str) -> AppError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        AppError::gateway_unavailable(format!(
            "Paystack {} failed with HTTP {}",
            operation,
            status.as_u16()
        ))
    } else {
        AppError::gateway(format!(
            "Paystack rejected {} with HTTP {}",
            operation,
            status.as_u16()
        ))
    }
}

fn transport_error(operation: &str, e: &reqwest::Error) -> AppError {
    let cause = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection failed"
    } else {
        "transport error"
    };
    tracing::warn!(gateway = "paystack", operation, error = %e, "Gateway call failed");
    AppError::gateway_unavailable(format!("Paystack {}: {}", operation, cause))
}

fn middleware_error(operation: &str, e: reqwest_middleware::Error) -> AppError {
    match e {
        reqwest_middleware::Error::Reqwest(e) => transport_error(operation, &e),
        reqwest_middleware::Error::Middleware(e) => {
            tracing::warn!(gateway = "paystack", operation, error = %e, "Gateway middleware failed");
            AppError::gateway_unavailable(format!("Paystack {}: retries exhausted", operation))
        }
    }
}

/// Map the provider's transaction status onto the three states we act on
fn charge_status(raw: &str) -> ChargeStatus {
    match raw {
        "success" => ChargeStatus::Success,
        "failed" | "reversed" => ChargeStatus::Failed,
        // abandoned, ongoing, pending, processing, queued: payer may still complete
        _ => ChargeStatus::Pending,
    }
}

impl TryFrom<VerifyData> for ChargeVerification {
    type Error = AppError;

    fn try_from(data: VerifyData) -> Result<Self> {
        let currency = Currency::from_str(&data.currency).map_err(|_| {
            AppError::gateway(format!(
                "Paystack reported unsupported currency '{}' for '{}'",
                data.currency, data.reference
            ))
        })?;

        Ok(Self {
            status: charge_status(&data.status),
            reference: data.reference,
            amount_minor: data.amount,
            currency,
            channel: data.channel,
            gateway_response: data.gateway_response,
        })
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    async fn initialize_charge(&self, request: ChargeRequest) -> Result<ChargeSession> {
        let url = self.endpoint(&["transaction", "initialize"])?;

        let body = InitializeBody {
            email: &request.email,
            amount: request.amount_minor,
            currency: request.currency.to_string(),
            reference: &request.reference,
            callback_url: request.callback_url.as_deref(),
            metadata: &request.metadata,
        };

        // Plain client: a replayed initialize could open a second checkout
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error("initialize", &e))?;

        let data: InitializeData = Self::read_envelope(response, "initialize").await?;

        if data.reference != request.reference {
            tracing::error!(
                gateway = "paystack",
                expected = %request.reference,
                received = %data.reference,
                "Gateway echoed a different reference"
            );
            return Err(AppError::gateway("Paystack returned a mismatched reference"));
        }

        Ok(ChargeSession {
            reference: data.reference,
            authorization_url: data.authorization_url,
            access_code: data.access_code,
        })
    }

    async fn verify_charge(&self, reference: &str) -> Result<ChargeVerification> {
        let url = self.endpoint(&["transaction", "verify", reference])?;

        let response = self
            .retrying_client
            .get(url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| middleware_error("verify", e))?;

        let data: VerifyData = Self::read_envelope(response, "verify").await?;
        ChargeVerification::try_from(data)
    }

    fn verify_webhook_signature(&self, signature: &str, payload: &[u8]) -> bool {
        let Ok(expected) = hex::decode(signature.trim()) else {
            return false;
        };
        let Ok(mut mac) = HmacSha512::new_from_slice(self.secret_key.as_bytes()) else {
            return false;
        };
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    }

    fn name(&self) -> &str {
        "paystack"
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        matches!(
            currency,
            Currency::NGN | Currency::GHS | Currency::ZAR | Currency::KES | Currency::USD
        )
    }
}

/// Hex HMAC-SHA512 of `payload`, as the gateway computes it for webhooks
pub fn sign_payload(secret_key: &str, payload: &[u8]) -> Result<String> {
    let mut mac = HmacSha512::new_from_slice(secret_key.as_bytes())
        .map_err(|e| AppError::internal(format!("Invalid HMAC key: {}", e)))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}
