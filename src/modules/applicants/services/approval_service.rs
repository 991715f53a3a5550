use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::core::{AppError, RequestIdentity, Result};
use crate::modules::applicants::models::{Applicant, SubmitApplicationRequest};
use crate::modules::enrollment::{EnrollmentStore, RejectOutcome};
use crate::modules::payments::models::Payment;
use crate::modules::reconciliation::services::link_is_broken;
use crate::modules::students::{MatricNumberFormat, Student};

/// Body returned by `POST /approve`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResult {
    pub applicant_id: String,
    pub student_id: String,
    pub matric_number: String,
}

/// Read model for the admin UI
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentDetails {
    pub applicant: Applicant,
    pub student: Option<Student>,
    pub latest_payment: Option<Payment>,
    pub needs_repair: bool,
}

/// Approval orchestrator
///
/// Drives the applicant state machine. Student rows are only ever created
/// through the store's atomic approve, never written here.
pub struct ApprovalService {
    store: Arc<dyn EnrollmentStore>,
    matric: Arc<dyn MatricNumberFormat>,
}

impl ApprovalService {
    pub fn new(store: Arc<dyn EnrollmentStore>, matric: Arc<dyn MatricNumberFormat>) -> Self {
        Self { store, matric }
    }

    pub async fn submit_application(&self, request: SubmitApplicationRequest) -> Result<Applicant> {
        let applicant = Applicant::new(request, Utc::now())?;
        self.store.insert_applicant(&applicant).await?;

        tracing::info!(applicant_id = %applicant.id, "Application submitted");
        Ok(applicant)
    }

    /// PENDING -> APPROVED with a freshly allocated matric number
    pub async fn approve(
        &self,
        identity: &RequestIdentity,
        applicant_id: &str,
    ) -> Result<ApprovalResult> {
        let applicant_id = require_applicant_id(applicant_id)?;

        let student = self
            .store
            .approve_applicant(
                applicant_id,
                &identity.actor_id,
                self.matric.as_ref(),
                Utc::now(),
            )
            .await
            .inspect_err(|e| log_refusal(e, applicant_id, identity, "approve"))?;

        tracing::info!(
            applicant_id,
            student_id = %student.id,
            matric_number = %student.matric_number,
            actor_id = %identity.actor_id,
            transition = "PENDING->APPROVED",
            "Applicant approved"
        );

        Ok(ApprovalResult {
            applicant_id: applicant_id.to_string(),
            student_id: student.id,
            matric_number: student.matric_number,
        })
    }

    /// PENDING -> REJECTED; rejecting twice succeeds without writing
    pub async fn reject(&self, identity: &RequestIdentity, applicant_id: &str) -> Result<Applicant> {
        let applicant_id = require_applicant_id(applicant_id)?;

        let outcome = self
            .store
            .reject_applicant(applicant_id, &identity.actor_id, Utc::now())
            .await
            .inspect_err(|e| log_refusal(e, applicant_id, identity, "reject"))?;

        match outcome {
            RejectOutcome::Rejected(applicant) => {
                tracing::info!(
                    applicant_id,
                    actor_id = %identity.actor_id,
                    transition = "PENDING->REJECTED",
                    "Applicant rejected"
                );
                Ok(applicant)
            }
            RejectOutcome::AlreadyRejected(applicant) => {
                tracing::debug!(applicant_id, "Reject is a no-op: already rejected");
                Ok(applicant)
            }
        }
    }

    pub async fn details(
        &self,
        identity: &RequestIdentity,
        applicant_id: &str,
    ) -> Result<EnrollmentDetails> {
        let applicant_id = require_applicant_id(applicant_id)?;

        let applicant = self
            .store
            .find_applicant(applicant_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Applicant '{}' not found", applicant_id)))?;

        let student = self.store.find_linked_student(&applicant.id).await?;

        let latest_payment = match &student {
            Some(s) => self
                .store
                .list_payments_for_student(&s.id)
                .await?
                .into_iter()
                .next(),
            None => None,
        };

        let needs_repair = link_is_broken(&applicant, student.as_ref());
        if needs_repair {
            tracing::warn!(
                applicant_id,
                actor_id = %identity.actor_id,
                "Approved applicant has no linked student"
            );
        }

        Ok(EnrollmentDetails {
            applicant,
            student,
            latest_payment,
            needs_repair,
        })
    }
}

pub(crate) fn require_applicant_id(id: &str) -> Result<&str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(AppError::validation("applicantId is required"));
    }
    Ok(id)
}

fn log_refusal(error: &AppError, applicant_id: &str, identity: &RequestIdentity, attempted: &str) {
    if let AppError::InvalidState { current, .. } = error {
        tracing::warn!(
            applicant_id,
            actor_id = %identity.actor_id,
            current = %current,
            attempted,
            "Applicant transition refused"
        );
    }
}
