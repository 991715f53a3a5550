use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::modules::applicants::models::Applicant;

/// Enrolled learner, created at approval time
///
/// `matric_number` is assigned exactly once and never changes. `is_paid` and
/// `paid_at` are written only by a verified payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    /// Back-reference to the applicant; empty only inside the crash window repair closes
    pub applicant_id: Option<String>,
    pub matric_number: String,
    pub full_name: String,
    pub email: String,
    pub cohort: Option<String>,
    /// When the originating application was submitted; drives pricing
    pub applied_at: DateTime<Utc>,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Student {
    /// Build the student row provisioned for an applicant
    pub fn for_applicant(applicant: &Applicant, matric_number: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            applicant_id: Some(applicant.id.clone()),
            matric_number,
            full_name: applicant.full_name.clone(),
            email: applicant.email.clone(),
            cohort: applicant.cohort.clone(),
            applied_at: applicant.created_at,
            is_paid: false,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this student row plausibly belongs to `applicant`
    ///
    /// Matches on the back-reference, or, when the back-reference was never
    /// written, on the applicant's email.
    pub fn matches_applicant(&self, applicant: &Applicant) -> bool {
        match &self.applicant_id {
            Some(id) => id == &applicant.id,
            None => self.email.eq_ignore_ascii_case(&applicant.email),
        }
    }

    pub fn mark_paid(&mut self, now: DateTime<Utc>) {
        self.is_paid = true;
        self.paid_at = Some(now);
        self.updated_at = now;
    }
}
