//! Document-store backend: every aggregate lives in one mutex-guarded state,
//! so each repository call is a single serializable unit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::database::repository::{
    AttemptRepository, PaymentRepository, QuestionRepository, StartOutcome, StatusRepository,
    StudentRepository, TermsRepository,
};
use crate::error::{Error, Result};
use crate::models::eligibility::EligibilitySnapshot;
use crate::models::payment::{NewPayment, Payment, PaymentStatus, PaymentUpdate};
use crate::models::question::Question;
use crate::models::student::{apply_profile_update, NewStudent, ProfileUpdate, Student};
use crate::models::student_status::StudentStatus;
use crate::models::terms_acceptance::{NewTermsAcceptance, TermsAcceptance};
use crate::models::test_attempt::{
    AttemptFinalization, AttemptGrade, AttemptStatus, NewAttempt, TestAttempt,
};

#[derive(Default)]
struct MemoryState {
    students: HashMap<Uuid, Student>,
    statuses: HashMap<Uuid, StudentStatus>,
    acceptances: Vec<TermsAcceptance>,
    payments: Vec<Payment>,
    attempts: HashMap<Uuid, TestAttempt>,
    questions: BTreeMap<i32, Question>,
}

impl MemoryState {
    fn student_mut(&mut self, id: Uuid) -> Result<&mut Student> {
        self.students
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Student {} not found", id)))
    }

    fn refresh_status(&mut self, student_id: Uuid) {
        let Some(student) = self.students.get(&student_id) else {
            return;
        };
        let terms = self.acceptances.iter().any(|a| a.student_id == student_id);
        let paid = self
            .payments
            .iter()
            .any(|p| p.student_id == student_id && p.status == PaymentStatus::Completed);
        let status = StudentStatus::derive(
            student_id,
            terms,
            paid,
            student.profile_complete,
            Utc::now(),
        );
        self.statuses.insert(student_id, status);
    }

    fn snapshot(&self, student_id: Uuid) -> Option<EligibilitySnapshot> {
        let student = self.students.get(&student_id)?;
        let status = self.statuses.get(&student_id)?;
        let mut has_in_progress = false;
        let mut attempt_count = 0;
        for a in self.attempts.values().filter(|a| a.student_id == student_id) {
            attempt_count += 1;
            has_in_progress |= a.status == AttemptStatus::InProgress;
        }
        Some(EligibilitySnapshot {
            active: student.active,
            terms_accepted: status.terms_accepted,
            payment_completed: status.payment_completed,
            profile_complete: status.profile_complete,
            has_in_progress,
            attempt_count,
        })
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_questions(questions: Vec<Question>) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            for q in questions {
                state.questions.insert(q.id, q);
            }
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // Mutations never leave partial state behind, so poisoning is ignored.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl StudentRepository for MemoryStore {
    async fn create_student(&self, new: NewStudent) -> Result<Student> {
        let mut state = self.lock();
        let email = new.email.to_lowercase();
        if state.students.values().any(|s| s.email == email) {
            return Err(Error::Conflict("Email is already registered".to_string()));
        }
        let now = Utc::now();
        let student = Student {
            id: Uuid::new_v4(),
            email,
            password_hash: new.password_hash,
            name: new.name,
            phone: None,
            college: None,
            roll_number: None,
            branch: None,
            year: None,
            profile_complete: false,
            email_verified: false,
            active: true,
            login_attempts: 0,
            lock_until: None,
            reset_token: None,
            reset_token_expires: None,
            verification_token: Some(new.verification_token),
            verification_token_expires: Some(new.verification_token_expires),
            created_at: now,
            updated_at: now,
        };
        state.students.insert(student.id, student.clone());
        state.refresh_status(student.id);
        Ok(student)
    }

    async fn find_student(&self, id: Uuid) -> Result<Option<Student>> {
        Ok(self.lock().students.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Student>> {
        let email = email.to_lowercase();
        Ok(self
            .lock()
            .students
            .values()
            .find(|s| s.email == email)
            .cloned())
    }

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<Student>> {
        Ok(self
            .lock()
            .students
            .values()
            .find(|s| s.verification_token.as_deref() == Some(token))
            .cloned())
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<Student>> {
        Ok(self
            .lock()
            .students
            .values()
            .find(|s| s.reset_token.as_deref() == Some(token))
            .cloned())
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Student> {
        let mut state = self.lock();
        let student = state.student_mut(id)?;
        apply_profile_update(student, &update);
        student.updated_at = Utc::now();
        let updated = student.clone();
        state.refresh_status(id);
        Ok(updated)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<Student> {
        let mut state = self.lock();
        let student = state.student_mut(id)?;
        student.active = active;
        student.updated_at = Utc::now();
        Ok(student.clone())
    }

    async fn record_login_failure(
        &self,
        id: Uuid,
        max_attempts: i32,
        lock_until: DateTime<Utc>,
    ) -> Result<Student> {
        let mut state = self.lock();
        let student = state.student_mut(id)?;
        student.login_attempts += 1;
        if student.login_attempts >= max_attempts {
            student.lock_until = Some(lock_until);
            student.login_attempts = 0;
        }
        student.updated_at = Utc::now();
        Ok(student.clone())
    }

    async fn reset_login_failures(&self, id: Uuid) -> Result<()> {
        let mut state = self.lock();
        let student = state.student_mut(id)?;
        student.login_attempts = 0;
        student.lock_until = None;
        Ok(())
    }

    async fn mark_email_verified(&self, id: Uuid) -> Result<()> {
        let mut state = self.lock();
        let student = state.student_mut(id)?;
        student.email_verified = true;
        student.verification_token = None;
        student.verification_token_expires = None;
        Ok(())
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: Option<String>,
        expires: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut state = self.lock();
        let student = state.student_mut(id)?;
        student.reset_token = token;
        student.reset_token_expires = expires;
        Ok(())
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
        let mut state = self.lock();
        let student = state.student_mut(id)?;
        student.password_hash = password_hash.to_string();
        student.reset_token = None;
        student.reset_token_expires = None;
        student.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl TermsRepository for MemoryStore {
    async fn record_acceptance(&self, new: NewTermsAcceptance) -> Result<TermsAcceptance> {
        let mut state = self.lock();
        if !state.students.contains_key(&new.student_id) {
            return Err(Error::NotFound(format!("Student {} not found", new.student_id)));
        }
        let acceptance = TermsAcceptance {
            id: Uuid::new_v4(),
            student_id: new.student_id,
            terms_version: new.terms_version,
            accepted_at: Utc::now(),
            ip_address: new.ip_address,
            user_agent: new.user_agent,
        };
        state.acceptances.push(acceptance.clone());
        state.refresh_status(new.student_id);
        Ok(acceptance)
    }

    async fn list_acceptances(&self, student_id: Uuid) -> Result<Vec<TermsAcceptance>> {
        Ok(self
            .lock()
            .acceptances
            .iter()
            .filter(|a| a.student_id == student_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PaymentRepository for MemoryStore {
    async fn create_payment(&self, new: NewPayment) -> Result<Payment> {
        let mut state = self.lock();
        if !state.students.contains_key(&new.student_id) {
            return Err(Error::NotFound(format!("Student {} not found", new.student_id)));
        }
        if state
            .payments
            .iter()
            .any(|p| p.external_order_id == new.external_order_id)
        {
            return Err(Error::Conflict("Order id has already been used".to_string()));
        }
        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            student_id: new.student_id,
            external_order_id: new.external_order_id,
            external_payment_id: None,
            amount: new.amount,
            currency: new.currency,
            status: PaymentStatus::Pending,
            method: None,
            refund_id: None,
            refund_amount: None,
            refunded_at: None,
            created_at: now,
            updated_at: now,
        };
        state.payments.push(payment.clone());
        Ok(payment)
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Payment>> {
        Ok(self
            .lock()
            .payments
            .iter()
            .find(|p| p.external_order_id == order_id)
            .cloned())
    }

    async fn list_payments(&self, student_id: Uuid) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .lock()
            .payments
            .iter()
            .filter(|p| p.student_id == student_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    async fn transition(
        &self,
        order_id: &str,
        expected: PaymentStatus,
        next: PaymentStatus,
        update: PaymentUpdate,
    ) -> Result<Option<Payment>> {
        let mut state = self.lock();
        if let Some(payment_id) = update.external_payment_id.as_deref() {
            let taken = state.payments.iter().any(|p| {
                p.external_order_id != order_id
                    && p.external_payment_id.as_deref() == Some(payment_id)
            });
            if taken {
                return Err(Error::Conflict("Payment id has already been recorded".to_string()));
            }
        }
        let Some(payment) = state
            .payments
            .iter_mut()
            .find(|p| p.external_order_id == order_id && p.status == expected)
        else {
            return Ok(None);
        };
        payment.status = next;
        if update.external_payment_id.is_some() {
            payment.external_payment_id = update.external_payment_id;
        }
        if update.method.is_some() {
            payment.method = update.method;
        }
        if update.refund_id.is_some() {
            payment.refund_id = update.refund_id;
            payment.refund_amount = update.refund_amount;
            payment.refunded_at = update.refunded_at;
        }
        payment.updated_at = Utc::now();
        let payment = payment.clone();
        state.refresh_status(payment.student_id);
        Ok(Some(payment))
    }
}

#[async_trait]
impl StatusRepository for MemoryStore {
    async fn get_status(&self, student_id: Uuid) -> Result<Option<StudentStatus>> {
        Ok(self.lock().statuses.get(&student_id).cloned())
    }
}

#[async_trait]
impl AttemptRepository for MemoryStore {
    async fn eligibility_snapshot(&self, student_id: Uuid) -> Result<Option<EligibilitySnapshot>> {
        Ok(self.lock().snapshot(student_id))
    }

    async fn start_attempt(&self, new: NewAttempt, max_attempts: i64) -> Result<StartOutcome> {
        let mut state = self.lock();
        let snapshot = state
            .snapshot(new.student_id)
            .ok_or_else(|| Error::NotFound(format!("Student {} not found", new.student_id)))?;
        if let Some(reason) = snapshot.decide(max_attempts).reason {
            return Ok(StartOutcome::Denied(reason));
        }
        let next_number = state
            .attempts
            .values()
            .filter(|a| a.student_id == new.student_id)
            .map(|a| a.attempt_number)
            .max()
            .unwrap_or(0)
            + 1;
        let attempt = TestAttempt::from_new(new, next_number);
        state.attempts.insert(attempt.id, attempt.clone());
        Ok(StartOutcome::Started(attempt))
    }

    async fn find_attempt(&self, id: Uuid) -> Result<Option<TestAttempt>> {
        Ok(self.lock().attempts.get(&id).cloned())
    }

    async fn list_attempts(&self, student_id: Uuid) -> Result<Vec<TestAttempt>> {
        let mut attempts: Vec<TestAttempt> = self
            .lock()
            .attempts
            .values()
            .filter(|a| a.student_id == student_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.attempt_number);
        Ok(attempts)
    }

    async fn finalize(&self, id: Uuid, fin: AttemptFinalization) -> Result<Option<TestAttempt>> {
        let mut state = self.lock();
        match state.attempts.get_mut(&id) {
            Some(attempt) if attempt.status == AttemptStatus::InProgress => {
                attempt.apply_finalization(&fin);
                Ok(Some(attempt.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn record_warning(
        &self,
        id: Uuid,
        threshold: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<TestAttempt>> {
        let mut state = self.lock();
        match state.attempts.get_mut(&id) {
            Some(attempt) if attempt.status == AttemptStatus::InProgress => {
                attempt.warnings_count += 1;
                if attempt.warnings_count > threshold {
                    attempt.status = AttemptStatus::Disqualified;
                    attempt.end_time = Some(now);
                    attempt.duration_seconds =
                        Some(crate::utils::time::seconds_between(attempt.start_time, now));
                }
                attempt.updated_at = now;
                Ok(Some(attempt.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_in_progress_started_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<TestAttempt>> {
        Ok(self
            .lock()
            .attempts
            .values()
            .filter(|a| a.status == AttemptStatus::InProgress && a.start_time < cutoff)
            .cloned()
            .collect())
    }

    async fn update_grade(&self, id: Uuid, grade: AttemptGrade) -> Result<Option<TestAttempt>> {
        let mut state = self.lock();
        match state.attempts.get_mut(&id) {
            Some(attempt) if attempt.status == AttemptStatus::Completed => {
                attempt.apply_grade(&grade);
                attempt.updated_at = Utc::now();
                Ok(Some(attempt.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl QuestionRepository for MemoryStore {
    async fn list_active_questions(&self) -> Result<Vec<Question>> {
        Ok(self
            .lock()
            .questions
            .values()
            .filter(|q| q.active)
            .cloned()
            .collect())
    }

    async fn find_questions(&self, ids: &[i32]) -> Result<Vec<Question>> {
        let state = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| state.questions.get(id).cloned())
            .collect())
    }

    async fn upsert_questions(&self, questions: Vec<Question>) -> Result<Vec<Question>> {
        if let Some(bad) = questions
            .iter()
            .find(|q| q.correct_option < 0 || q.correct_option as usize >= q.options.len())
        {
            return Err(Error::Validation(format!(
                "Question {} has no option {}",
                bad.id, bad.correct_option
            )));
        }
        let mut state = self.lock();
        for q in &questions {
            state.questions.insert(q.id, q.clone());
        }
        Ok(questions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn new_student(email: &str) -> NewStudent {
        NewStudent {
            email: email.to_string(),
            password_hash: "hash".into(),
            name: Some("Ravi".into()),
            verification_token: format!("verify-{}", email),
            verification_token_expires: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_conflicts_case_insensitively() {
        let store = MemoryStore::new();
        store.create_student(new_student("ravi@example.com")).await.unwrap();
        let err = store
            .create_student(new_student("Ravi@Example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn projection_follows_payment_transitions() {
        let store = MemoryStore::new();
        let student = store.create_student(new_student("p@example.com")).await.unwrap();
        store
            .create_payment(NewPayment {
                student_id: student.id,
                external_order_id: "order_1".into(),
                amount: Decimal::new(50000, 2),
                currency: "INR".into(),
            })
            .await
            .unwrap();
        assert!(!store.get_status(student.id).await.unwrap().unwrap().payment_completed);

        let done = store
            .transition("order_1", PaymentStatus::Pending, PaymentStatus::Completed, PaymentUpdate::default())
            .await
            .unwrap();
        assert!(done.is_some());
        assert!(store.get_status(student.id).await.unwrap().unwrap().payment_completed);

        let stale = store
            .transition("order_1", PaymentStatus::Pending, PaymentStatus::Failed, PaymentUpdate::default())
            .await
            .unwrap();
        assert!(stale.is_none());

        store
            .transition("order_1", PaymentStatus::Completed, PaymentStatus::Refunded, PaymentUpdate::default())
            .await
            .unwrap();
        assert!(!store.get_status(student.id).await.unwrap().unwrap().payment_completed);
    }

    #[tokio::test]
    async fn order_ids_are_never_reused() {
        let store = MemoryStore::new();
        let student = store.create_student(new_student("o@example.com")).await.unwrap();
        let order = NewPayment {
            student_id: student.id,
            external_order_id: "order_x".into(),
            amount: Decimal::ONE,
            currency: "INR".into(),
        };
        store.create_payment(order.clone()).await.unwrap();
        assert!(matches!(
            store.create_payment(order).await.unwrap_err(),
            Error::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn lockout_after_max_failures() {
        let store = MemoryStore::new();
        let student = store.create_student(new_student("l@example.com")).await.unwrap();
        let until = Utc::now() + chrono::Duration::minutes(15);
        let s = store.record_login_failure(student.id, 2, until).await.unwrap();
        assert_eq!(s.login_attempts, 1);
        assert!(s.lock_until.is_none());
        let s = store.record_login_failure(student.id, 2, until).await.unwrap();
        assert_eq!(s.lock_until, Some(until));
        assert_eq!(s.login_attempts, 0);
    }

    #[tokio::test]
    async fn question_batch_is_all_or_nothing() {
        let store = MemoryStore::new();
        let question = |id: i32, correct_option: i32| Question {
            id,
            question: format!("Q{}", id),
            options: vec!["a".into(), "b".into()],
            correct_option,
            active: true,
        };

        let err = store
            .upsert_questions(vec![question(1, 0), question(2, 5)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(store.list_active_questions().await.unwrap().is_empty());

        let saved = store
            .upsert_questions(vec![question(1, 0), question(2, 1)])
            .await
            .unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(store.find_questions(&[1, 2]).await.unwrap().len(), 2);
    }
}
