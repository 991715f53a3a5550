// Applicant record: a submitted application, pre-enrollment.
//
// Status moves PENDING -> APPROVED or PENDING -> REJECTED and never back.
// `student_id` is the Applicant -> Student link; once written it is never
// reassigned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::core::{AppError, Result};

/// Applicant status lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ApplicantStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicantStatus {
    /// Whether `self -> next` is an edge of the applicant state machine
    pub fn can_transition_to(&self, next: ApplicantStatus) -> bool {
        matches!(
            (self, next),
            (ApplicantStatus::Pending, ApplicantStatus::Approved)
                | (ApplicantStatus::Pending, ApplicantStatus::Rejected)
        )
    }
}

impl std::fmt::Display for ApplicantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplicantStatus::Pending => write!(f, "PENDING"),
            ApplicantStatus::Approved => write!(f, "APPROVED"),
            ApplicantStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

impl std::str::FromStr for ApplicantStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ApplicantStatus::Pending),
            "APPROVED" => Ok(ApplicantStatus::Approved),
            "REJECTED" => Ok(ApplicantStatus::Rejected),
            _ => Err(format!("Invalid applicant status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Applicant {
    pub id: String,
    /// Legal name, printed verbatim on certificates
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub cohort: Option<String>,
    pub status: ApplicantStatus,
    pub student_id: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Intake payload for a new application
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitApplicationRequest {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub cohort: Option<String>,
}

impl Applicant {
    /// Create a new PENDING applicant after validating the intake fields
    pub fn new(request: SubmitApplicationRequest, now: DateTime<Utc>) -> Result<Self> {
        if request.full_name.trim().is_empty() {
            return Err(AppError::validation("Full name cannot be empty"));
        }

        let email = request.email.trim().to_string();
        if !is_plausible_email(&email) {
            return Err(AppError::validation(format!(
                "Invalid email address '{}'",
                email
            )));
        }

        if request.phone.trim().is_empty() {
            return Err(AppError::validation("Phone number cannot be empty"));
        }

        let cohort = request
            .cohort
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            // Kept verbatim: no trimming or case folding of the legal name
            full_name: request.full_name,
            email,
            phone: request.phone.trim().to_string(),
            cohort,
            status: ApplicantStatus::Pending,
            student_id: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApplicantStatus::Pending
    }

    pub fn is_approved(&self) -> bool {
        self.status == ApplicantStatus::Approved
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}
