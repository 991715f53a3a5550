use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::pricing::{PricingEngine, PricingSubject};
use crate::core::{AppError, Currency, RequestIdentity, Result};
use crate::modules::enrollment::{EnrollmentStore, Settlement, SettlementOutcome};
use crate::modules::gateways::{ChargeRequest, ChargeStatus, PaymentGateway};
use crate::modules::payments::models::{Payment, PaymentStatus};
use crate::modules::students::Student;

const MAX_REFERENCE_LEN: usize = 100;

/// Failure reason recorded for any gateway decline; provider wording stays in logs
pub const DECLINED_BY_GATEWAY: &str = "Declined by gateway";

/// Who is being charged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeTarget {
    Student(String),
    Applicant(String),
}

/// Body of `POST /payment/initialize`; exactly one id must be present
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializePaymentRequest {
    pub applicant_id: Option<String>,
    pub student_id: Option<String>,
}

impl TryFrom<InitializePaymentRequest> for ChargeTarget {
    type Error = AppError;

    fn try_from(request: InitializePaymentRequest) -> Result<Self> {
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        match (clean(request.student_id), clean(request.applicant_id)) {
            (Some(student_id), None) => Ok(ChargeTarget::Student(student_id)),
            (None, Some(applicant_id)) => Ok(ChargeTarget::Applicant(applicant_id)),
            (Some(_), Some(_)) => Err(AppError::validation(
                "Provide either studentId or applicantId, not both",
            )),
            (None, None) => Err(AppError::validation("studentId or applicantId is required")),
        }
    }
}

/// Checkout handed back to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeInitiated {
    pub authorization_url: String,
    pub reference: String,
    pub student_id: String,
    #[serde(rename = "amountMinorUnits")]
    pub amount_minor: i64,
    pub currency: Currency,
    pub discount_applied: bool,
    pub discount_percent: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Success,
    Failed,
    Pending,
    AlreadyPaid,
}

/// Outcome of verifying a reference
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub reference: String,
    pub status: VerificationStatus,
    pub student_id: String,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

/// Payment orchestrator
///
/// Prices a charge, opens the gateway checkout and settles verified results.
/// The store enforces the single-success rule; this service only decides
/// which verdict to hand it.
pub struct PaymentService {
    store: Arc<dyn EnrollmentStore>,
    gateway: Arc<dyn PaymentGateway>,
    pricing: Arc<PricingEngine>,
    callback_url: Option<String>,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn EnrollmentStore>,
        gateway: Arc<dyn PaymentGateway>,
        pricing: Arc<PricingEngine>,
        callback_url: Option<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            pricing,
            callback_url,
        }
    }

    /// Open a new checkout for an unpaid student
    ///
    /// Every call is a fresh attempt with a fresh reference. Fails with
    /// `AlreadyPaid` once the student has a confirmed payment.
    pub async fn initiate_charge(
        &self,
        identity: &RequestIdentity,
        target: ChargeTarget,
    ) -> Result<ChargeInitiated> {
        let student = self.resolve_student(&target).await?;

        if student.is_paid {
            tracing::warn!(
                student_id = %student.id,
                actor_id = %identity.actor_id,
                "Charge refused: student already paid"
            );
            return Err(AppError::AlreadyPaid(student.id));
        }

        let quote = self.pricing.quote(&PricingSubject::from(&student));

        if quote.amount_minor <= 0 {
            tracing::error!(
                student_id = %student.id,
                discount = quote.discount_name.as_deref().unwrap_or_default(),
                "Pricing produced a non-positive charge"
            );
            return Err(AppError::Configuration(format!(
                "Quoted amount must be positive, got {}",
                quote.amount_minor
            )));
        }

        if !self.gateway.supports_currency(quote.currency) {
            return Err(AppError::Configuration(format!(
                "Gateway '{}' does not support currency {}",
                self.gateway.name(),
                quote.currency
            )));
        }

        let reference = new_reference();

        let session = self
            .gateway
            .initialize_charge(ChargeRequest {
                reference: reference.clone(),
                email: student.email.clone(),
                amount_minor: quote.amount_minor,
                currency: quote.currency,
                callback_url: self.callback_url.clone(),
                metadata: json!({
                    "studentId": student.id,
                    "applicantId": student.applicant_id,
                    "matricNumber": student.matric_number,
                    "discountName": quote.discount_name,
                }),
            })
            .await?;

        let payment = Payment::pending(
            &student,
            &quote,
            reference,
            session.authorization_url,
            Utc::now(),
        )?;

        self.store.record_pending_payment(&payment).await?;

        tracing::info!(
            student_id = %student.id,
            reference = %payment.reference,
            actor_id = %identity.actor_id,
            amount = %payment.currency.format_minor(payment.amount_minor),
            discount_applied = payment.discount_applied,
            "Payment initiated"
        );

        Ok(ChargeInitiated {
            authorization_url: payment.authorization_url,
            reference: payment.reference,
            student_id: payment.student_id,
            amount_minor: payment.amount_minor,
            currency: payment.currency,
            discount_applied: payment.discount_applied,
            discount_percent: payment.discount_percent,
        })
    }

    /// Confirm a reference with the gateway and settle it
    ///
    /// Safe to call any number of times, concurrently, from the redirect and
    /// from webhooks. Gateway failures leave every record untouched.
    pub async fn verify_charge(
        &self,
        identity: &RequestIdentity,
        reference: &str,
    ) -> Result<VerificationResult> {
        validate_reference(reference)?;

        let payment = self
            .store
            .find_payment_by_reference(reference)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("Payment with reference '{}' not found", reference))
            })?;

        let student = self
            .store
            .find_student(&payment.student_id)
            .await?
            .ok_or_else(|| {
                AppError::internal(format!(
                    "Payment '{}' points at missing student '{}'",
                    payment.reference, payment.student_id
                ))
            })?;

        if student.is_paid {
            tracing::debug!(reference, student_id = %student.id, "Verify short-circuited: already paid");
            return Ok(already_paid(reference, &student));
        }

        if !payment.is_pending() {
            return Ok(from_payment(&payment, &student));
        }

        let verification = self.gateway.verify_charge(reference).await?;

        let settlement = match verification.status {
            ChargeStatus::Pending => {
                tracing::debug!(reference, "Gateway still pending, nothing written");
                return Ok(VerificationResult {
                    reference: reference.to_string(),
                    status: VerificationStatus::Pending,
                    student_id: student.id,
                    is_paid: false,
                    paid_at: None,
                    failure_reason: None,
                });
            }
            ChargeStatus::Failed => {
                tracing::debug!(
                    reference,
                    gateway_response = verification.gateway_response.as_deref().unwrap_or_default(),
                    "Gateway declined charge"
                );
                Settlement::Failed {
                    reason: DECLINED_BY_GATEWAY.to_string(),
                    gateway_amount_minor: Some(verification.amount_minor),
                }
            }
            ChargeStatus::Success => {
                if verification.reference != payment.reference
                    || verification.amount_minor != payment.amount_minor
                    || verification.currency != payment.currency
                {
                    tracing::error!(
                        reference,
                        student_id = %student.id,
                        expected_amount = payment.amount_minor,
                        reported_amount = verification.amount_minor,
                        expected_currency = %payment.currency,
                        reported_currency = %verification.currency,
                        "Gateway reported a success that does not match the quoted charge"
                    );
                    Settlement::Failed {
                        reason: format!(
                            "Amount mismatch: expected {}, gateway reported {}",
                            payment.currency.format_minor(payment.amount_minor),
                            verification.currency.format_minor(verification.amount_minor)
                        ),
                        gateway_amount_minor: Some(verification.amount_minor),
                    }
                } else {
                    Settlement::Succeeded {
                        amount_minor: verification.amount_minor,
                        channel: verification.channel.clone(),
                    }
                }
            }
        };

        let outcome = self
            .store
            .settle_payment(reference, settlement, Utc::now())
            .await?;

        Ok(match outcome {
            SettlementOutcome::Paid {
                payment,
                student,
                superseded,
            } => {
                tracing::info!(
                    reference = %payment.reference,
                    student_id = %student.id,
                    actor_id = %identity.actor_id,
                    superseded,
                    transition = "pending->success",
                    "Payment verified, student marked paid"
                );
                from_payment(&payment, &student)
            }
            SettlementOutcome::Failed { payment } => {
                tracing::warn!(
                    reference = %payment.reference,
                    student_id = %payment.student_id,
                    actor_id = %identity.actor_id,
                    reason = payment.failure_reason.as_deref().unwrap_or_default(),
                    transition = "pending->failed",
                    "Payment failed"
                );
                from_payment(&payment, &student)
            }
            SettlementOutcome::AlreadyPaid { student } => already_paid(reference, &student),
            SettlementOutcome::Unchanged { payment } => from_payment(&payment, &student),
        })
    }

    async fn resolve_student(&self, target: &ChargeTarget) -> Result<Student> {
        match target {
            ChargeTarget::Student(id) => self
                .store
                .find_student(id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Student '{}' not found", id))),
            ChargeTarget::Applicant(id) => {
                let applicant = self
                    .store
                    .find_applicant(id)
                    .await?
                    .ok_or_else(|| AppError::not_found(format!("Applicant '{}' not found", id)))?;

                match self.store.find_linked_student(&applicant.id).await? {
                    Some(student) => Ok(student),
                    None => Err(AppError::invalid_state(
                        "applicant",
                        &applicant.id,
                        if applicant.is_approved() {
                            "APPROVED without a linked student".to_string()
                        } else {
                            applicant.status.to_string()
                        },
                        "charge",
                    )),
                }
            }
        }
    }
}

fn new_reference() -> String {
    format!("enr_{}", Uuid::new_v4().simple())
}

pub(crate) fn validate_reference(reference: &str) -> Result<()> {
    if reference.is_empty() || reference.len() > MAX_REFERENCE_LEN {
        return Err(AppError::validation(format!(
            "Reference must be 1-{} characters",
            MAX_REFERENCE_LEN
        )));
    }

    if !reference
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '='))
    {
        return Err(AppError::validation("Reference contains invalid characters"));
    }

    Ok(())
}

fn already_paid(reference: &str, student: &Student) -> VerificationResult {
    VerificationResult {
        reference: reference.to_string(),
        status: VerificationStatus::AlreadyPaid,
        student_id: student.id.clone(),
        is_paid: true,
        paid_at: student.paid_at,
        failure_reason: None,
    }
}

fn from_payment(payment: &Payment, student: &Student) -> VerificationResult {
    let status = match payment.status {
        PaymentStatus::Success => VerificationStatus::Success,
        PaymentStatus::Failed => VerificationStatus::Failed,
        PaymentStatus::Pending => VerificationStatus::Pending,
        PaymentStatus::Superseded => VerificationStatus::AlreadyPaid,
    };

    VerificationResult {
        reference: payment.reference.clone(),
        status,
        student_id: student.id.clone(),
        is_paid: student.is_paid,
        paid_at: student.paid_at,
        failure_reason: payment.failure_reason.clone(),
    }
}
