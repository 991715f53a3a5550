use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::enrollment_store::{
    applicant_not_found, ensure_repairable, ensure_transition, payment_not_found, pick_orphan,
    student_not_found, EnrollmentStore, IssuedLink, RejectOutcome, RepairOutcome, Settlement,
    SettlementOutcome, MAX_MATRIC_ATTEMPTS,
};
use crate::core::{AppError, Result};
use crate::modules::applicants::models::{Applicant, ApplicantStatus};
use crate::modules::credentials::models::{LinkState, SetupLink};
use crate::modules::payments::models::{Payment, PaymentStatus};
use crate::modules::students::{MatricNumberFormat, Student};

#[derive(Default)]
struct State {
    applicants: HashMap<String, Applicant>,
    students: HashMap<String, Student>,
    matric_numbers: HashSet<String>,
    matric_sequence: u64,
    /// Keyed by gateway reference
    payments: HashMap<String, Payment>,
    /// Keyed by token hash
    setup_links: HashMap<String, SetupLink>,
}

impl State {
    fn allocate_matric(&mut self, format: &dyn MatricNumberFormat) -> Result<String> {
        for _ in 0..MAX_MATRIC_ATTEMPTS {
            self.matric_sequence += 1;
            let candidate = format.format(self.matric_sequence);
            if !self.matric_numbers.contains(&candidate) {
                return Ok(candidate);
            }
        }

        Err(AppError::internal(format!(
            "No free matric number after {} attempts",
            MAX_MATRIC_ATTEMPTS
        )))
    }

    fn insert_student(&mut self, student: Student) {
        self.matric_numbers.insert(student.matric_number.clone());
        self.students.insert(student.id.clone(), student);
    }

    fn linked_student(&self, applicant: &Applicant) -> Option<&Student> {
        applicant
            .student_id
            .as_deref()
            .and_then(|id| self.students.get(id))
    }
}

/// Thread-safe in-memory enrollment store
///
/// A single async mutex guards all tables, so every trait method is one
/// serializable critical section. Used for local development and tests.
#[derive(Default, Clone)]
pub struct InMemoryEnrollmentStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryEnrollmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write an applicant row as-is, bypassing the state machine (imports and fixtures)
    pub async fn put_applicant(&self, applicant: Applicant) {
        let mut state = self.state.lock().await;
        state.applicants.insert(applicant.id.clone(), applicant);
    }

    /// Write a student row as-is, bypassing approval (imports and fixtures)
    pub async fn put_student(&self, student: Student) {
        let mut state = self.state.lock().await;
        state.insert_student(student);
    }

    pub async fn student_count(&self) -> usize {
        self.state.lock().await.students.len()
    }

    pub async fn setup_links_for_student(&self, student_id: &str) -> Vec<SetupLink> {
        let state = self.state.lock().await;
        let mut links: Vec<SetupLink> = state
            .setup_links
            .values()
            .filter(|l| l.student_id == student_id)
            .cloned()
            .collect();
        links.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        links
    }
}

#[async_trait]
impl EnrollmentStore for InMemoryEnrollmentStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn insert_applicant(&self, applicant: &Applicant) -> Result<()> {
        let mut state = self.state.lock().await;

        if state.applicants.contains_key(&applicant.id) {
            return Err(AppError::validation(format!(
                "Applicant '{}' already exists",
                applicant.id
            )));
        }

        state
            .applicants
            .insert(applicant.id.clone(), applicant.clone());
        Ok(())
    }

    async fn find_applicant(&self, id: &str) -> Result<Option<Applicant>> {
        let state = self.state.lock().await;
        Ok(state.applicants.get(id).cloned())
    }

    async fn find_student(&self, id: &str) -> Result<Option<Student>> {
        let state = self.state.lock().await;
        Ok(state.students.get(id).cloned())
    }

    async fn find_linked_student(&self, applicant_id: &str) -> Result<Option<Student>> {
        let state = self.state.lock().await;
        Ok(state
            .applicants
            .get(applicant_id)
            .and_then(|a| state.linked_student(a))
            .cloned())
    }

    async fn find_payment_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
        let state = self.state.lock().await;
        Ok(state.payments.get(reference).cloned())
    }

    async fn list_payments_for_student(&self, student_id: &str) -> Result<Vec<Payment>> {
        let state = self.state.lock().await;
        let mut payments: Vec<Payment> = state
            .payments
            .values()
            .filter(|p| p.student_id == student_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(payments)
    }

    async fn approve_applicant(
        &self,
        applicant_id: &str,
        reviewer: &str,
        matric: &dyn MatricNumberFormat,
        now: DateTime<Utc>,
    ) -> Result<Student> {
        let mut state = self.state.lock().await;

        let mut applicant = state
            .applicants
            .get(applicant_id)
            .cloned()
            .ok_or_else(|| applicant_not_found(applicant_id))?;

        ensure_transition(&applicant, ApplicantStatus::Approved, "approve")?;

        // Nothing is written until every fallible step has succeeded
        let matric_number = state.allocate_matric(matric)?;
        let student = Student::for_applicant(&applicant, matric_number, now);

        applicant.status = ApplicantStatus::Approved;
        applicant.student_id = Some(student.id.clone());
        applicant.reviewed_by = Some(reviewer.to_string());
        applicant.reviewed_at = Some(now);
        applicant.updated_at = now;

        state.insert_student(student.clone());
        state.applicants.insert(applicant.id.clone(), applicant);

        Ok(student)
    }

    async fn reject_applicant(
        &self,
        applicant_id: &str,
        reviewer: &str,
        now: DateTime<Utc>,
    ) -> Result<RejectOutcome> {
        let mut state = self.state.lock().await;

        let applicant = state
            .applicants
            .get_mut(applicant_id)
            .ok_or_else(|| applicant_not_found(applicant_id))?;

        if applicant.status == ApplicantStatus::Rejected {
            return Ok(RejectOutcome::AlreadyRejected(applicant.clone()));
        }

        ensure_transition(applicant, ApplicantStatus::Rejected, "reject")?;

        applicant.status = ApplicantStatus::Rejected;
        applicant.reviewed_by = Some(reviewer.to_string());
        applicant.reviewed_at = Some(now);
        applicant.updated_at = now;

        Ok(RejectOutcome::Rejected(applicant.clone()))
    }

    async fn repair_applicant_link(
        &self,
        applicant_id: &str,
        matric: &dyn MatricNumberFormat,
        now: DateTime<Utc>,
    ) -> Result<RepairOutcome> {
        let mut state = self.state.lock().await;

        let mut applicant = state
            .applicants
            .get(applicant_id)
            .cloned()
            .ok_or_else(|| applicant_not_found(applicant_id))?;

        ensure_repairable(&applicant, state.linked_student(&applicant))?;

        let claimed: HashSet<&str> = state
            .applicants
            .values()
            .filter(|a| a.id != applicant.id)
            .filter_map(|a| a.student_id.as_deref())
            .collect();

        let orphan = pick_orphan(&applicant, state.students.values(), |s| {
            claimed.contains(s.id.as_str())
        })
        .cloned();

        let (student, relinked_existing) = match orphan {
            Some(mut student) => {
                student.applicant_id = Some(applicant.id.clone());
                student.updated_at = now;
                (student, true)
            }
            None => {
                let matric_number = state.allocate_matric(matric)?;
                (Student::for_applicant(&applicant, matric_number, now), false)
            }
        };

        applicant.student_id = Some(student.id.clone());
        applicant.updated_at = now;

        state.insert_student(student.clone());
        state
            .applicants
            .insert(applicant.id.clone(), applicant.clone());

        Ok(RepairOutcome {
            applicant,
            student,
            relinked_existing,
        })
    }

    async fn record_pending_payment(&self, payment: &Payment) -> Result<()> {
        let mut state = self.state.lock().await;

        let student = state
            .students
            .get(&payment.student_id)
            .ok_or_else(|| student_not_found(&payment.student_id))?;

        if student.is_paid {
            return Err(AppError::AlreadyPaid(student.id.clone()));
        }

        if state.payments.contains_key(&payment.reference) {
            return Err(AppError::internal(format!(
                "Duplicate payment reference '{}'",
                payment.reference
            )));
        }

        state
            .payments
            .insert(payment.reference.clone(), payment.clone());
        Ok(())
    }

    async fn settle_payment(
        &self,
        reference: &str,
        settlement: Settlement,
        now: DateTime<Utc>,
    ) -> Result<SettlementOutcome> {
        let mut state = self.state.lock().await;

        let mut payment = state
            .payments
            .get(reference)
            .cloned()
            .ok_or_else(|| payment_not_found(reference))?;

        let mut student = state
            .students
            .get(&payment.student_id)
            .cloned()
            .ok_or_else(|| student_not_found(&payment.student_id))?;

        if student.is_paid {
            return Ok(SettlementOutcome::AlreadyPaid { student });
        }

        if !payment.is_pending() {
            return Ok(SettlementOutcome::Unchanged { payment });
        }

        match settlement {
            Settlement::Succeeded {
                amount_minor,
                channel,
            } => {
                payment.mark_success(amount_minor, channel, now);
                student.mark_paid(now);

                let mut superseded = 0;
                for other in state.payments.values_mut() {
                    if other.student_id == student.id
                        && other.reference != payment.reference
                        && other.status != PaymentStatus::Success
                        && other.status != PaymentStatus::Superseded
                    {
                        other.mark_superseded(now);
                        superseded += 1;
                    }
                }

                state
                    .payments
                    .insert(payment.reference.clone(), payment.clone());
                state.students.insert(student.id.clone(), student.clone());

                Ok(SettlementOutcome::Paid {
                    payment,
                    student,
                    superseded,
                })
            }
            Settlement::Failed {
                reason,
                gateway_amount_minor,
            } => {
                payment.mark_failed(reason, gateway_amount_minor, now);
                state
                    .payments
                    .insert(payment.reference.clone(), payment.clone());
                Ok(SettlementOutcome::Failed { payment })
            }
        }
    }

    async fn issue_setup_link(&self, link: &SetupLink, now: DateTime<Utc>) -> Result<IssuedLink> {
        let mut state = self.state.lock().await;

        let student = state
            .students
            .get(&link.student_id)
            .ok_or_else(|| student_not_found(&link.student_id))?;

        if !student.is_paid {
            return Err(AppError::PaymentRequired(student.id.clone()));
        }

        let mut superseded = 0;
        for existing in state.setup_links.values_mut() {
            if existing.student_id == link.student_id && existing.is_outstanding() {
                existing.superseded_at = Some(now);
                superseded += 1;
            }
        }

        state
            .setup_links
            .insert(link.token_hash.clone(), link.clone());

        Ok(IssuedLink {
            link: link.clone(),
            superseded,
        })
    }

    async fn redeem_setup_link(&self, token_hash: &str, now: DateTime<Utc>) -> Result<SetupLink> {
        let mut state = self.state.lock().await;

        let link = state
            .setup_links
            .get_mut(token_hash)
            .ok_or_else(|| AppError::not_found("Setup link not found"))?;

        match link.state_at(now) {
            LinkState::Redeemable => {
                link.used_at = Some(now);
                Ok(link.clone())
            }
            other => Err(AppError::invalid_state("setup link", &link.id, other, "redeem")),
        }
    }
}
