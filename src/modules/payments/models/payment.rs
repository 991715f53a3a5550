use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::core::{AppError, Currency, Result};
use crate::modules::payments::services::pricing::Quote;
use crate::modules::students::Student;

const MAX_FAILURE_REASON_LEN: usize = 255;

/// Payment attempt status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Checkout opened, awaiting verification
    #[default]
    Pending,

    /// Gateway-confirmed; at most one per student
    Success,

    /// Gateway-confirmed failure, or amount/currency mismatch
    Failed,

    /// Another attempt for the same student succeeded; kept for audit
    Superseded,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Success => write!(f, "success"),
            PaymentStatus::Failed => write!(f, "failed"),
            PaymentStatus::Superseded => write!(f, "superseded"),
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "success" => Ok(PaymentStatus::Success),
            "failed" => Ok(PaymentStatus::Failed),
            "superseded" => Ok(PaymentStatus::Superseded),
            _ => Err(format!("Invalid payment status: {}", s)),
        }
    }
}

/// One charge attempt against the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,

    /// Gateway reference, unique per attempt
    pub reference: String,

    pub student_id: String,
    pub applicant_id: Option<String>,
    pub status: PaymentStatus,

    /// Quoted amount in minor units
    pub amount_minor: i64,
    pub currency: Currency,
    pub discount_applied: bool,
    pub discount_percent: Decimal,

    /// Hosted checkout URL
    pub authorization_url: String,

    /// Amount the gateway reported at verification
    pub gateway_amount_minor: Option<i64>,
    pub channel: Option<String>,
    pub failure_reason: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Create a pending attempt from a quote and the gateway's checkout session
    pub fn pending(
        student: &Student,
        quote: &Quote,
        reference: String,
        authorization_url: String,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if reference.trim().is_empty() {
            return Err(AppError::validation("Payment reference cannot be empty"));
        }

        if authorization_url.trim().is_empty() {
            return Err(AppError::gateway("Gateway returned an empty authorization URL"));
        }

        if quote.amount_minor <= 0 {
            return Err(AppError::validation(format!(
                "Quoted amount must be positive, got {}",
                quote.amount_minor
            )));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            reference,
            student_id: student.id.clone(),
            applicant_id: student.applicant_id.clone(),
            status: PaymentStatus::Pending,
            amount_minor: quote.amount_minor,
            currency: quote.currency,
            discount_applied: quote.discount_applied,
            discount_percent: quote.discount_percent,
            authorization_url,
            gateway_amount_minor: None,
            channel: None,
            failure_reason: None,
            verified_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == PaymentStatus::Pending
    }

    pub fn is_success(&self) -> bool {
        self.status == PaymentStatus::Success
    }

    pub fn mark_success(&mut self, gateway_amount_minor: i64, channel: Option<String>, now: DateTime<Utc>) {
        self.status = PaymentStatus::Success;
        self.gateway_amount_minor = Some(gateway_amount_minor);
        self.channel = channel;
        self.verified_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, reason: String, gateway_amount_minor: Option<i64>, now: DateTime<Utc>) {
        self.status = PaymentStatus::Failed;
        self.failure_reason = Some(truncate_reason(reason));
        self.gateway_amount_minor = gateway_amount_minor;
        self.verified_at = Some(now);
        self.updated_at = now;
    }

    pub fn mark_superseded(&mut self, now: DateTime<Utc>) {
        self.status = PaymentStatus::Superseded;
        self.updated_at = now;
    }
}

/// Fits the `failure_reason` column
fn truncate_reason(mut reason: String) -> String {
    if let Some((cut, _)) = reason.char_indices().nth(MAX_FAILURE_REASON_LEN) {
        reason.truncate(cut);
    }
    reason
}
