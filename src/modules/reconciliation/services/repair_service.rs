// Reconciliation of the Applicant -> Student link.
//
// A crash between approval steps on a legacy deployment, or a partial import,
// can leave an APPROVED applicant whose link is empty or dangling. Repair
// relinks an orphaned student when one exists and only mints a new matric
// number when none does.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::core::{AppError, RequestIdentity, Result};
use crate::modules::applicants::models::Applicant;
use crate::modules::applicants::services::approval_service::require_applicant_id;
use crate::modules::enrollment::EnrollmentStore;
use crate::modules::students::{MatricNumberFormat, Student};

/// Body returned by `POST /repair-link`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairResult {
    pub applicant_id: String,
    pub student_id: String,
    pub matric_number: String,
    pub relinked_existing: bool,
}

/// True iff the applicant is APPROVED and its student link does not resolve
pub fn link_is_broken(applicant: &Applicant, linked: Option<&Student>) -> bool {
    applicant.is_approved() && linked.is_none()
}

pub struct RepairService {
    store: Arc<dyn EnrollmentStore>,
    matric: Arc<dyn MatricNumberFormat>,
}

impl RepairService {
    pub fn new(store: Arc<dyn EnrollmentStore>, matric: Arc<dyn MatricNumberFormat>) -> Self {
        Self { store, matric }
    }

    pub async fn detect_broken_link(&self, applicant_id: &str) -> Result<bool> {
        let applicant_id = require_applicant_id(applicant_id)?;
        let applicant = self
            .store
            .find_applicant(applicant_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Applicant '{}' not found", applicant_id)))?;

        let linked = self.store.find_linked_student(&applicant.id).await?;
        Ok(link_is_broken(&applicant, linked.as_ref()))
    }

    pub async fn repair(&self, identity: &RequestIdentity, applicant_id: &str) -> Result<RepairResult> {
        let applicant_id = require_applicant_id(applicant_id)?;
        let outcome = self
            .store
            .repair_applicant_link(applicant_id, self.matric.as_ref(), Utc::now())
            .await
            .inspect_err(|e| {
                if matches!(e, AppError::InvalidState { .. }) {
                    tracing::warn!(
                        applicant_id,
                        actor_id = %identity.actor_id,
                        transition = "repair",
                        error = %e,
                        "Repair refused"
                    );
                }
            })?;

        tracing::info!(
            applicant_id = %outcome.applicant.id,
            student_id = %outcome.student.id,
            matric_number = %outcome.student.matric_number,
            relinked_existing = outcome.relinked_existing,
            actor_id = %identity.actor_id,
            "Applicant link repaired"
        );

        Ok(RepairResult {
            applicant_id: outcome.applicant.id,
            student_id: outcome.student.id,
            matric_number: outcome.student.matric_number,
            relinked_existing: outcome.relinked_existing,
        })
    }
}
