//! Storage seams. Services only ever see these traits; the relational
//! ([`crate::database::postgres::PgStore`]) and document
//! ([`crate::database::memory::MemoryStore`]) backends are interchangeable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::models::eligibility::{EligibilitySnapshot, ReasonCode};
use crate::models::payment::{NewPayment, Payment, PaymentStatus, PaymentUpdate};
use crate::models::question::Question;
use crate::models::student::{NewStudent, ProfileUpdate, Student};
use crate::models::student_status::StudentStatus;
use crate::models::terms_acceptance::{NewTermsAcceptance, TermsAcceptance};
use crate::models::test_attempt::{AttemptFinalization, AttemptGrade, NewAttempt, TestAttempt};

#[async_trait]
pub trait StudentRepository: Send + Sync {
    /// Creates the student and its status projection row together.
    /// Duplicate email yields `Error::Conflict`.
    async fn create_student(&self, new: NewStudent) -> Result<Student>;

    async fn find_student(&self, id: Uuid) -> Result<Option<Student>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Student>>;

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<Student>>;

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<Student>>;

    /// Applies the update, recomputes `profile_complete` and refreshes the
    /// status projection in the same unit of work.
    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Student>;

    async fn set_active(&self, id: Uuid, active: bool) -> Result<Student>;

    /// Increments the failure counter; once it reaches `max_attempts` the
    /// account is locked until `lock_until` and the counter resets.
    async fn record_login_failure(
        &self,
        id: Uuid,
        max_attempts: i32,
        lock_until: DateTime<Utc>,
    ) -> Result<Student>;

    async fn reset_login_failures(&self, id: Uuid) -> Result<()>;

    async fn mark_email_verified(&self, id: Uuid) -> Result<()>;

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: Option<String>,
        expires: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Stores the new hash and clears any reset token.
    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<()>;
}

#[async_trait]
pub trait TermsRepository: Send + Sync {
    async fn record_acceptance(&self, new: NewTermsAcceptance) -> Result<TermsAcceptance>;

    async fn list_acceptances(&self, student_id: Uuid) -> Result<Vec<TermsAcceptance>>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// `external_order_id` is unique; reuse yields `Error::Conflict`.
    async fn create_payment(&self, new: NewPayment) -> Result<Payment>;

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Payment>>;

    async fn list_payments(&self, student_id: Uuid) -> Result<Vec<Payment>>;

    /// Compare-and-swap on status. Returns `None` when the stored status was
    /// not `expected` (or the order does not exist).
    async fn transition(
        &self,
        order_id: &str,
        expected: PaymentStatus,
        next: PaymentStatus,
        update: PaymentUpdate,
    ) -> Result<Option<Payment>>;
}

#[async_trait]
pub trait StatusRepository: Send + Sync {
    async fn get_status(&self, student_id: Uuid) -> Result<Option<StudentStatus>>;
}

#[derive(Debug, Clone)]
pub enum StartOutcome {
    Started(TestAttempt),
    Denied(ReasonCode),
}

#[async_trait]
pub trait AttemptRepository: Send + Sync {
    async fn eligibility_snapshot(&self, student_id: Uuid) -> Result<Option<EligibilitySnapshot>>;

    /// Re-evaluates eligibility from the projection and inserts the attempt
    /// as one serializable unit per student. The attempt number is
    /// `max(existing) + 1`.
    async fn start_attempt(&self, new: NewAttempt, max_attempts: i64) -> Result<StartOutcome>;

    async fn find_attempt(&self, id: Uuid) -> Result<Option<TestAttempt>>;

    async fn list_attempts(&self, student_id: Uuid) -> Result<Vec<TestAttempt>>;

    /// Moves an in-progress attempt to a terminal state. `None` if it was no
    /// longer in progress.
    async fn finalize(&self, id: Uuid, fin: AttemptFinalization) -> Result<Option<TestAttempt>>;

    /// Increments the warning counter of an in-progress attempt and
    /// disqualifies it at `now` once the count exceeds `threshold`.
    async fn record_warning(
        &self,
        id: Uuid,
        threshold: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<TestAttempt>>;

    async fn list_in_progress_started_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<TestAttempt>>;

    /// Overwrites the grade of a completed attempt.
    async fn update_grade(&self, id: Uuid, grade: AttemptGrade) -> Result<Option<TestAttempt>>;
}

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    async fn list_active_questions(&self) -> Result<Vec<Question>>;

    async fn find_questions(&self, ids: &[i32]) -> Result<Vec<Question>>;

    /// Inserts or replaces the whole batch as one unit; on error nothing is
    /// written.
    async fn upsert_questions(&self, questions: Vec<Question>) -> Result<Vec<Question>>;
}

/// The set of stores a deployment runs against.
#[derive(Clone)]
pub struct Repositories {
    pub students: Arc<dyn StudentRepository>,
    pub terms: Arc<dyn TermsRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub statuses: Arc<dyn StatusRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub questions: Arc<dyn QuestionRepository>,
}

impl Repositories {
    pub fn postgres(store: crate::database::postgres::PgStore) -> Self {
        Self::from_store(Arc::new(store))
    }

    pub fn in_memory(store: crate::database::memory::MemoryStore) -> Self {
        Self::from_store(Arc::new(store))
    }

    fn from_store<S>(store: Arc<S>) -> Self
    where
        S: StudentRepository
            + TermsRepository
            + PaymentRepository
            + StatusRepository
            + AttemptRepository
            + QuestionRepository
            + 'static,
    {
        Self {
            students: store.clone(),
            terms: store.clone(),
            payments: store.clone(),
            statuses: store.clone(),
            attempts: store.clone(),
            questions: store,
        }
    }
}
