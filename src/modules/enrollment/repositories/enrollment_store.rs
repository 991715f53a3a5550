// Enrollment store: the single source of truth for applicants, students,
// payments and setup links.
//
// Every operation that touches more than one record is a single method here
// and runs as one transaction in the backing implementation. Callers never
// compose multi-record writes from smaller pieces.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::{AppError, Result};
use crate::modules::applicants::models::{Applicant, ApplicantStatus};
use crate::modules::credentials::models::SetupLink;
use crate::modules::payments::models::Payment;
use crate::modules::students::{MatricNumberFormat, Student};

/// Upper bound on matric candidates tried before giving up on a collision run
pub const MAX_MATRIC_ATTEMPTS: u32 = 64;

/// Result of a reject call; both variants are success for the caller
#[derive(Debug, Clone, PartialEq)]
pub enum RejectOutcome {
    Rejected(Applicant),
    AlreadyRejected(Applicant),
}

/// Result of repairing an applicant's student link
#[derive(Debug, Clone, PartialEq)]
pub struct RepairOutcome {
    pub applicant: Applicant,
    pub student: Student,
    /// True when an existing orphaned student was linked instead of minting one
    pub relinked_existing: bool,
}

/// Gateway verdict to apply to a pending payment
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Succeeded {
        amount_minor: i64,
        channel: Option<String>,
    },
    Failed {
        reason: String,
        gateway_amount_minor: Option<i64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    /// This call won the is_paid transition
    Paid {
        payment: Payment,
        student: Student,
        superseded: u64,
    },
    /// Payment marked failed; the student stays unpaid
    Failed { payment: Payment },
    /// The student was already paid; nothing was written
    AlreadyPaid { student: Student },
    /// The payment had already left `pending`; nothing was written
    Unchanged { payment: Payment },
}

/// A freshly stored setup link and how many older links it replaced
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedLink {
    pub link: SetupLink,
    pub superseded: u64,
}

#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// Connectivity probe for readiness checks
    async fn ping(&self) -> Result<()>;

    async fn insert_applicant(&self, applicant: &Applicant) -> Result<()>;

    async fn find_applicant(&self, id: &str) -> Result<Option<Applicant>>;

    async fn find_student(&self, id: &str) -> Result<Option<Student>>;

    /// The student the applicant's link points at, if the link exists and resolves
    async fn find_linked_student(&self, applicant_id: &str) -> Result<Option<Student>>;

    async fn find_payment_by_reference(&self, reference: &str) -> Result<Option<Payment>>;

    /// Newest first
    async fn list_payments_for_student(&self, student_id: &str) -> Result<Vec<Payment>>;

    /// PENDING -> APPROVED plus matric allocation and student creation, atomically
    async fn approve_applicant(
        &self,
        applicant_id: &str,
        reviewer: &str,
        matric: &dyn MatricNumberFormat,
        now: DateTime<Utc>,
    ) -> Result<Student>;

    /// PENDING -> REJECTED; a second reject is a no-op
    async fn reject_applicant(
        &self,
        applicant_id: &str,
        reviewer: &str,
        now: DateTime<Utc>,
    ) -> Result<RejectOutcome>;

    /// Link an APPROVED applicant without a student to an orphan or a new student
    async fn repair_applicant_link(
        &self,
        applicant_id: &str,
        matric: &dyn MatricNumberFormat,
        now: DateTime<Utc>,
    ) -> Result<RepairOutcome>;

    /// Persist a pending attempt; refuses with `AlreadyPaid` under the student lock
    async fn record_pending_payment(&self, payment: &Payment) -> Result<()>;

    /// Apply a gateway verdict; at most one success per student ever applies
    async fn settle_payment(
        &self,
        reference: &str,
        settlement: Settlement,
        now: DateTime<Utc>,
    ) -> Result<SettlementOutcome>;

    /// Store a new link and supersede the student's outstanding ones
    async fn issue_setup_link(&self, link: &SetupLink, now: DateTime<Utc>) -> Result<IssuedLink>;

    /// Consume a link by token hash
    async fn redeem_setup_link(&self, token_hash: &str, now: DateTime<Utc>) -> Result<SetupLink>;
}

// Guards shared by every store implementation so both enforce identical rules.

pub(crate) fn applicant_not_found(id: &str) -> AppError {
    AppError::not_found(format!("Applicant '{}' not found", id))
}

pub(crate) fn student_not_found(id: &str) -> AppError {
    AppError::not_found(format!("Student '{}' not found", id))
}

pub(crate) fn payment_not_found(reference: &str) -> AppError {
    AppError::not_found(format!("Payment with reference '{}' not found", reference))
}

pub(crate) fn ensure_transition(
    applicant: &Applicant,
    next: ApplicantStatus,
    attempted: &str,
) -> Result<()> {
    if applicant.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(AppError::invalid_state(
            "applicant",
            &applicant.id,
            applicant.status,
            attempted,
        ))
    }
}

/// Repair is legal only for an APPROVED applicant whose link does not resolve
pub(crate) fn ensure_repairable(applicant: &Applicant, linked: Option<&Student>) -> Result<()> {
    if !applicant.is_approved() {
        return Err(AppError::invalid_state(
            "applicant",
            &applicant.id,
            applicant.status,
            "repair",
        ));
    }

    if linked.is_some() {
        return Err(AppError::invalid_state(
            "applicant",
            &applicant.id,
            "APPROVED with a linked student",
            "repair",
        ));
    }

    Ok(())
}

/// Oldest candidate that belongs to `applicant` and is not claimed by anyone else
pub(crate) fn pick_orphan<'a, I>(
    applicant: &Applicant,
    candidates: I,
    is_claimed: impl Fn(&Student) -> bool,
) -> Option<&'a Student>
where
    I: IntoIterator<Item = &'a Student>,
{
    candidates
        .into_iter()
        .filter(|s| s.matches_applicant(applicant) && !is_claimed(s))
        .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
}
