use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlDatabaseError;
use sqlx::{MySql, MySqlPool, Transaction};

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

const APPLICANT_COLUMNS: &str = "id, full_name, email, phone, cohort, status, student_id, \
     reviewed_by, reviewed_at, created_at, updated_at";

const STUDENT_COLUMNS: &str = "id, applicant_id, matric_number, full_name, email, cohort, \
     applied_at, is_paid, paid_at, created_at, updated_at";

const ALIASED_STUDENT_COLUMNS: &str = "s.id, s.applicant_id, s.matric_number, s.full_name, \
     s.email, s.cohort, s.applied_at, s.is_paid, s.paid_at, s.created_at, s.updated_at";

const PAYMENT_COLUMNS: &str = "id, reference, student_id, applicant_id, status, amount_minor, \
     currency, discount_applied, discount_percent, authorization_url, gateway_amount_minor, \
     channel, failure_reason, verified_at, created_at, updated_at";

const SETUP_LINK_COLUMNS: &str =
    "id, token_hash, student_id, expires_at, used_at, superseded_at, created_at";

const MATRIC_SEQUENCE: &str = "matric";

/// ER_LOCK_WAIT_TIMEOUT
const ER_LOCK_WAIT_TIMEOUT: u16 = 1205;
/// ER_LOCK_DEADLOCK
const ER_LOCK_DEADLOCK: u16 = 1213;

pub(crate) fn is_lock_contention(error_number: u16) -> bool {
    matches!(error_number, ER_LOCK_WAIT_TIMEOUT | ER_LOCK_DEADLOCK)
}

fn db_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| {
        let contended = e
            .as_database_error()
            .and_then(|db| db.try_downcast_ref::<MySqlDatabaseError>())
            .map(|db| is_lock_contention(db.number()))
            .unwrap_or(false);

        if contended {
            tracing::warn!(error = %e, "{}: lock contention, transaction rolled back", context);
            AppError::StorageContention(format!("{}: {}", context, e))
        } else {
            AppError::Internal(format!("{}: {}", context, e))
        }
    }
}

/// MySQL-backed enrollment store
///
/// Multi-row operations run in one transaction and take row locks in a fixed
/// order: applicant, then the matric sequence row, then students, then the
/// payments and setup links beneath a student. Deadlocks and lock-wait
/// timeouts surface as the retryable `StorageContention`.
pub struct MySqlEnrollmentStore {
    pool: MySqlPool,
}

impl MySqlEnrollmentStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    async fn lock_applicant(
        tx: &mut Transaction<'_, MySql>,
        applicant_id: &str,
    ) -> Result<Applicant> {
        let sql = format!(
            "SELECT {} FROM applicants WHERE id = ? FOR UPDATE",
            APPLICANT_COLUMNS
        );
        sqlx::query_as::<_, Applicant>(&sql)
            .bind(applicant_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err("Failed to lock applicant"))?
            .ok_or_else(|| applicant_not_found(applicant_id))
    }

    async fn lock_student(tx: &mut Transaction<'_, MySql>, student_id: &str) -> Result<Student> {
        let sql = format!(
            "SELECT {} FROM students WHERE id = ? FOR UPDATE",
            STUDENT_COLUMNS
        );
        sqlx::query_as::<_, Student>(&sql)
            .bind(student_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err("Failed to lock student"))?
            .ok_or_else(|| student_not_found(student_id))
    }

    async fn find_student_in_tx(
        tx: &mut Transaction<'_, MySql>,
        student_id: &str,
    ) -> Result<Option<Student>> {
        let sql = format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS);
        sqlx::query_as::<_, Student>(&sql)
            .bind(student_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err("Failed to fetch student"))
    }

    /// Lock the matric sequence row; returns the next value to try
    async fn lock_matric_sequence(tx: &mut Transaction<'_, MySql>) -> Result<i64> {
        let (next,): (i64,) = sqlx::query_as(
            "SELECT next_value FROM matric_sequences WHERE name = ? FOR UPDATE",
        )
        .bind(MATRIC_SEQUENCE)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_err("Failed to lock matric sequence"))?
        .ok_or_else(|| AppError::Configuration("Matric sequence row is missing".to_string()))?;

        Ok(next)
    }

    /// Take the next free matric number; the sequence row must already be locked
    async fn allocate_matric(
        tx: &mut Transaction<'_, MySql>,
        format: &dyn MatricNumberFormat,
        mut next: i64,
    ) -> Result<String> {
        for _ in 0..MAX_MATRIC_ATTEMPTS {
            let sequence = u64::try_from(next)
                .map_err(|_| AppError::internal(format!("Matric sequence is negative: {}", next)))?;
            let candidate = format.format(sequence);
            next += 1;

            let (taken,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM students WHERE matric_number = ?")
                    .bind(&candidate)
                    .fetch_one(&mut **tx)
                    .await
                    .map_err(db_err("Failed to check matric number"))?;

            if taken == 0 {
                sqlx::query("UPDATE matric_sequences SET next_value = ? WHERE name = ?")
                    .bind(next)
                    .bind(MATRIC_SEQUENCE)
                    .execute(&mut **tx)
                    .await
                    .map_err(db_err("Failed to advance matric sequence"))?;
                return Ok(candidate);
            }
        }

        Err(AppError::internal(format!(
            "No free matric number after {} attempts",
            MAX_MATRIC_ATTEMPTS
        )))
    }

    async fn insert_student(tx: &mut Transaction<'_, MySql>, student: &Student) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO students (
                id, applicant_id, matric_number, full_name, email, cohort,
                applied_at, is_paid, paid_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&student.id)
        .bind(&student.applicant_id)
        .bind(&student.matric_number)
        .bind(&student.full_name)
        .bind(&student.email)
        .bind(&student.cohort)
        .bind(student.applied_at)
        .bind(student.is_paid)
        .bind(student.paid_at)
        .bind(student.created_at)
        .bind(student.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(db_err("Failed to create student"))?;

        Ok(())
    }
}

#[async_trait]
impl EnrollmentStore for MySqlEnrollmentStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err("Database ping failed"))?;
        Ok(())
    }

    async fn insert_applicant(&self, applicant: &Applicant) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO applicants (
                id, full_name, email, phone, cohort, status, student_id,
                reviewed_by, reviewed_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&applicant.id)
        .bind(&applicant.full_name)
        .bind(&applicant.email)
        .bind(&applicant.phone)
        .bind(&applicant.cohort)
        .bind(applicant.status)
        .bind(&applicant.student_id)
        .bind(&applicant.reviewed_by)
        .bind(applicant.reviewed_at)
        .bind(applicant.created_at)
        .bind(applicant.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to create applicant"))?;

        Ok(())
    }

    async fn find_applicant(&self, id: &str) -> Result<Option<Applicant>> {
        let sql = format!("SELECT {} FROM applicants WHERE id = ?", APPLICANT_COLUMNS);
        sqlx::query_as::<_, Applicant>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to fetch applicant"))
    }

    async fn find_student(&self, id: &str) -> Result<Option<Student>> {
        let sql = format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS);
        sqlx::query_as::<_, Student>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to fetch student"))
    }

    async fn find_linked_student(&self, applicant_id: &str) -> Result<Option<Student>> {
        let sql = format!(
            "SELECT {} FROM students s \
             INNER JOIN applicants a ON a.student_id = s.id \
             WHERE a.id = ?",
            ALIASED_STUDENT_COLUMNS
        );
        sqlx::query_as::<_, Student>(&sql)
            .bind(applicant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to fetch linked student"))
    }

    async fn find_payment_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
        let sql = format!("SELECT {} FROM payments WHERE reference = ?", PAYMENT_COLUMNS);
        sqlx::query_as::<_, Payment>(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to fetch payment"))
    }

    async fn list_payments_for_student(&self, student_id: &str) -> Result<Vec<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE student_id = ? ORDER BY created_at DESC, id DESC",
            PAYMENT_COLUMNS
        );
        sqlx::query_as::<_, Payment>(&sql)
            .bind(student_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err("Failed to list payments"))
    }

    async fn approve_applicant(
        &self,
        applicant_id: &str,
        reviewer: &str,
        matric: &dyn MatricNumberFormat,
        now: DateTime<Utc>,
    ) -> Result<Student> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin transaction"))?;

        let applicant = Self::lock_applicant(&mut tx, applicant_id).await?;
        ensure_transition(&applicant, ApplicantStatus::Approved, "approve")?;

        let next = Self::lock_matric_sequence(&mut tx).await?;
        let matric_number = Self::allocate_matric(&mut tx, matric, next).await?;
        let student = Student::for_applicant(&applicant, matric_number, now);
        Self::insert_student(&mut tx, &student).await?;

        sqlx::query(
            r#"
            UPDATE applicants
            SET status = ?, student_id = ?, reviewed_by = ?, reviewed_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(ApplicantStatus::Approved)
        .bind(&student.id)
        .bind(reviewer)
        .bind(now)
        .bind(now)
        .bind(applicant_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("Failed to approve applicant"))?;

        tx.commit()
            .await
            .map_err(db_err("Failed to commit transaction"))?;

        Ok(student)
    }

    async fn reject_applicant(
        &self,
        applicant_id: &str,
        reviewer: &str,
        now: DateTime<Utc>,
    ) -> Result<RejectOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin transaction"))?;

        let mut applicant = Self::lock_applicant(&mut tx, applicant_id).await?;

        if applicant.status == ApplicantStatus::Rejected {
            return Ok(RejectOutcome::AlreadyRejected(applicant));
        }

        ensure_transition(&applicant, ApplicantStatus::Rejected, "reject")?;

        sqlx::query(
            r#"
            UPDATE applicants
            SET status = ?, reviewed_by = ?, reviewed_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(ApplicantStatus::Rejected)
        .bind(reviewer)
        .bind(now)
        .bind(now)
        .bind(applicant_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("Failed to reject applicant"))?;

        tx.commit()
            .await
            .map_err(db_err("Failed to commit transaction"))?;

        applicant.status = ApplicantStatus::Rejected;
        applicant.reviewed_by = Some(reviewer.to_string());
        applicant.reviewed_at = Some(now);
        applicant.updated_at = now;

        Ok(RejectOutcome::Rejected(applicant))
    }

    async fn repair_applicant_link(
        &self,
        applicant_id: &str,
        matric: &dyn MatricNumberFormat,
        now: DateTime<Utc>,
    ) -> Result<RepairOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin transaction"))?;

        let mut applicant = Self::lock_applicant(&mut tx, applicant_id).await?;

        let linked = match applicant.student_id.as_deref() {
            Some(student_id) => Self::find_student_in_tx(&mut tx, student_id).await?,
            None => None,
        };
        ensure_repairable(&applicant, linked.as_ref())?;

        // Same order as approve: the sequence row before any students lock
        let next = Self::lock_matric_sequence(&mut tx).await?;

        // Candidates: back-referenced rows, plus unreferenced rows with the same email,
        // minus anything another applicant already points at
        let sql = format!(
            r#"
            SELECT {} FROM students s
            WHERE (s.applicant_id = ? OR (s.applicant_id IS NULL AND LOWER(s.email) = LOWER(?)))
              AND NOT EXISTS (
                  SELECT 1 FROM applicants a WHERE a.student_id = s.id AND a.id <> ?
              )
            ORDER BY s.created_at ASC, s.id ASC
            FOR UPDATE
            "#,
            ALIASED_STUDENT_COLUMNS
        );
        let candidates = sqlx::query_as::<_, Student>(&sql)
            .bind(&applicant.id)
            .bind(&applicant.email)
            .bind(&applicant.id)
            .fetch_all(&mut *tx)
            .await
            .map_err(db_err("Failed to search orphaned students"))?;

        let orphan = pick_orphan(&applicant, candidates.iter(), |_| false).cloned();

        let (student, relinked_existing) = match orphan {
            Some(mut student) => {
                student.applicant_id = Some(applicant.id.clone());
                student.updated_at = now;

                sqlx::query("UPDATE students SET applicant_id = ?, updated_at = ? WHERE id = ?")
                    .bind(&applicant.id)
                    .bind(now)
                    .bind(&student.id)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err("Failed to relink student"))?;

                (student, true)
            }
            None => {
                let matric_number = Self::allocate_matric(&mut tx, matric, next).await?;
                let student = Student::for_applicant(&applicant, matric_number, now);
                Self::insert_student(&mut tx, &student).await?;
                (student, false)
            }
        };

        sqlx::query("UPDATE applicants SET student_id = ?, updated_at = ? WHERE id = ?")
            .bind(&student.id)
            .bind(now)
            .bind(&applicant.id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("Failed to link applicant"))?;

        tx.commit()
            .await
            .map_err(db_err("Failed to commit transaction"))?;

        applicant.student_id = Some(student.id.clone());
        applicant.updated_at = now;

        Ok(RepairOutcome {
            applicant,
            student,
            relinked_existing,
        })
    }

    async fn record_pending_payment(&self, payment: &Payment) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin transaction"))?;

        let student = Self::lock_student(&mut tx, &payment.student_id).await?;
        if student.is_paid {
            return Err(AppError::AlreadyPaid(student.id));
        }

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, reference, student_id, applicant_id, status, amount_minor,
                currency, discount_applied, discount_percent, authorization_url,
                gateway_amount_minor, channel, failure_reason, verified_at,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.reference)
        .bind(&payment.student_id)
        .bind(&payment.applicant_id)
        .bind(payment.status)
        .bind(payment.amount_minor)
        .bind(payment.currency)
        .bind(payment.discount_applied)
        .bind(payment.discount_percent)
        .bind(&payment.authorization_url)
        .bind(payment.gateway_amount_minor)
        .bind(&payment.channel)
        .bind(&payment.failure_reason)
        .bind(payment.verified_at)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err("Failed to record payment"))?;

        tx.commit()
            .await
            .map_err(db_err("Failed to commit transaction"))?;

        Ok(())
    }

    async fn settle_payment(
        &self,
        reference: &str,
        settlement: Settlement,
        now: DateTime<Utc>,
    ) -> Result<SettlementOutcome> {
        // Unlocked read only to learn the student; the row is re-read under lock below
        let student_id = self
            .find_payment_by_reference(reference)
            .await?
            .ok_or_else(|| payment_not_found(reference))?
            .student_id;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin transaction"))?;

        let mut student = Self::lock_student(&mut tx, &student_id).await?;

        let sql = format!(
            "SELECT {} FROM payments WHERE reference = ? FOR UPDATE",
            PAYMENT_COLUMNS
        );
        let mut payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(reference)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err("Failed to lock payment"))?
            .ok_or_else(|| payment_not_found(reference))?;

        if student.is_paid {
            return Ok(SettlementOutcome::AlreadyPaid { student });
        }

        if !payment.is_pending() {
            return Ok(SettlementOutcome::Unchanged { payment });
        }

        let outcome = match settlement {
            Settlement::Succeeded {
                amount_minor,
                channel,
            } => {
                payment.mark_success(amount_minor, channel, now);
                student.mark_paid(now);

                sqlx::query(
                    r#"
                    UPDATE payments
                    SET status = ?, gateway_amount_minor = ?, channel = ?, verified_at = ?, updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(payment.status)
                .bind(payment.gateway_amount_minor)
                .bind(&payment.channel)
                .bind(payment.verified_at)
                .bind(now)
                .bind(&payment.id)
                .execute(&mut *tx)
                .await
                .map_err(db_err("Failed to mark payment successful"))?;

                sqlx::query("UPDATE students SET is_paid = TRUE, paid_at = ?, updated_at = ? WHERE id = ?")
                    .bind(now)
                    .bind(now)
                    .bind(&student.id)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err("Failed to mark student paid"))?;

                let superseded = sqlx::query(
                    r#"
                    UPDATE payments
                    SET status = ?, updated_at = ?
                    WHERE student_id = ? AND id <> ? AND status IN (?, ?)
                    "#,
                )
                .bind(PaymentStatus::Superseded)
                .bind(now)
                .bind(&student.id)
                .bind(&payment.id)
                .bind(PaymentStatus::Pending)
                .bind(PaymentStatus::Failed)
                .execute(&mut *tx)
                .await
                .map_err(db_err("Failed to supersede payments"))?
                .rows_affected();

                SettlementOutcome::Paid {
                    payment,
                    student,
                    superseded,
                }
            }
            Settlement::Failed {
                reason,
                gateway_amount_minor,
            } => {
                payment.mark_failed(reason, gateway_amount_minor, now);

                sqlx::query(
                    r#"
                    UPDATE payments
                    SET status = ?, failure_reason = ?, gateway_amount_minor = ?, verified_at = ?, updated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(payment.status)
                .bind(&payment.failure_reason)
                .bind(payment.gateway_amount_minor)
                .bind(payment.verified_at)
                .bind(now)
                .bind(&payment.id)
                .execute(&mut *tx)
                .await
                .map_err(db_err("Failed to mark payment failed"))?;

                SettlementOutcome::Failed { payment }
            }
        };

        tx.commit()
            .await
            .map_err(db_err("Failed to commit transaction"))?;

        Ok(outcome)
    }

    async fn issue_setup_link(&self, link: &SetupLink, now: DateTime<Utc>) -> Result<IssuedLink> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin transaction"))?;

        let student = Self::lock_student(&mut tx, &link.student_id).await?;
        if !student.is_paid {
            return Err(AppError::PaymentRequired(student.id));
        }

        let superseded = sqlx::query(
            r#"
            UPDATE setup_links
            SET superseded_at = ?
            WHERE student_id = ? AND used_at IS NULL AND superseded_at IS NULL
            "#,
        )
        .bind(now)
        .bind(&link.student_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err("Failed to supersede setup links"))?
        .rows_affected();

        sqlx::query(
            r#"
            INSERT INTO setup_links (
                id, token_hash, student_id, expires_at, used_at, superseded_at, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&link.id)
        .bind(&link.token_hash)
        .bind(&link.student_id)
        .bind(link.expires_at)
        .bind(link.used_at)
        .bind(link.superseded_at)
        .bind(link.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err("Failed to create setup link"))?;

        tx.commit()
            .await
            .map_err(db_err("Failed to commit transaction"))?;

        Ok(IssuedLink {
            link: link.clone(),
            superseded,
        })
    }

    async fn redeem_setup_link(&self, token_hash: &str, now: DateTime<Utc>) -> Result<SetupLink> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin transaction"))?;

        let sql = format!(
            "SELECT {} FROM setup_links WHERE token_hash = ? FOR UPDATE",
            SETUP_LINK_COLUMNS
        );
        let mut link = sqlx::query_as::<_, SetupLink>(&sql)
            .bind(token_hash)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err("Failed to lock setup link"))?
            .ok_or_else(|| AppError::not_found("Setup link not found"))?;

        match link.state_at(now) {
            LinkState::Redeemable => {}
            other => return Err(AppError::invalid_state("setup link", &link.id, other, "redeem")),
        }

        sqlx::query("UPDATE setup_links SET used_at = ? WHERE id = ?")
            .bind(now)
            .bind(&link.id)
            .execute(&mut *tx)
            .await
            .map_err(db_err("Failed to redeem setup link"))?;

        tx.commit()
            .await
            .map_err(db_err("Failed to commit transaction"))?;

        link.used_at = Some(now);
        Ok(link)
    }
}
