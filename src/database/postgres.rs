//! Relational backend. Multi-row invariants (status projection, one
//! in-progress attempt per student) are maintained inside transactions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::database::repository::{
    AttemptRepository, PaymentRepository, QuestionRepository, StartOutcome, StatusRepository,
    StudentRepository, TermsRepository,
};
use crate::error::{Error, Result};
use crate::models::eligibility::{EligibilitySnapshot, ReasonCode};
use crate::models::payment::{NewPayment, Payment, PaymentStatus, PaymentUpdate};
use crate::models::question::Question;
use crate::models::student::{apply_profile_update, NewStudent, ProfileUpdate, Student};
use crate::models::student_status::StudentStatus;
use crate::models::terms_acceptance::{NewTermsAcceptance, TermsAcceptance};
use crate::models::test_attempt::{AttemptFinalization, AttemptGrade, NewAttempt, TestAttempt};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const REFRESH_STATUS_SQL: &str = r#"
    INSERT INTO student_status
        (student_id, terms_accepted, payment_completed, profile_complete, can_access_tests, updated_at)
    SELECT id, t, p, c, t AND p AND c, NOW()
    FROM (
        SELECT s.id,
               EXISTS(SELECT 1 FROM terms_acceptances ta WHERE ta.student_id = s.id) AS t,
               EXISTS(SELECT 1 FROM payments pm WHERE pm.student_id = s.id AND pm.status = 'completed') AS p,
               s.profile_complete AS c
        FROM students s
        WHERE s.id = $1
    ) src
    ON CONFLICT (student_id) DO UPDATE SET
        terms_accepted = EXCLUDED.terms_accepted,
        payment_completed = EXCLUDED.payment_completed,
        profile_complete = EXCLUDED.profile_complete,
        can_access_tests = EXCLUDED.can_access_tests,
        updated_at = EXCLUDED.updated_at
"#;

async fn refresh_status(conn: &mut PgConnection, student_id: Uuid) -> Result<()> {
    sqlx::query(REFRESH_STATUS_SQL)
        .bind(student_id)
        .execute(conn)
        .await?;
    Ok(())
}

#[derive(FromRow)]
struct SnapshotRow {
    active: bool,
    terms_accepted: bool,
    payment_completed: bool,
    profile_complete: bool,
    has_in_progress: bool,
    attempt_count: i64,
}

async fn load_snapshot(
    conn: &mut PgConnection,
    student_id: Uuid,
) -> Result<Option<EligibilitySnapshot>> {
    let row = sqlx::query_as::<_, SnapshotRow>(
        r#"
        SELECT s.active, ss.terms_accepted, ss.payment_completed, ss.profile_complete,
               EXISTS(SELECT 1 FROM test_attempts a
                      WHERE a.student_id = s.id AND a.status = 'in_progress') AS has_in_progress,
               (SELECT COUNT(*) FROM test_attempts a WHERE a.student_id = s.id) AS attempt_count
        FROM students s
        JOIN student_status ss ON ss.student_id = s.id
        WHERE s.id = $1
        "#,
    )
    .bind(student_id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(|r| EligibilitySnapshot {
        active: r.active,
        terms_accepted: r.terms_accepted,
        payment_completed: r.payment_completed,
        profile_complete: r.profile_complete,
        has_in_progress: r.has_in_progress,
        attempt_count: r.attempt_count,
    }))
}

#[derive(FromRow)]
struct PaymentRow {
    id: Uuid,
    student_id: Uuid,
    external_order_id: String,
    external_payment_id: Option<String>,
    amount: Decimal,
    currency: String,
    status: String,
    method: Option<String>,
    refund_id: Option<String>,
    refund_amount: Option<Decimal>,
    refunded_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = Error;

    fn try_from(r: PaymentRow) -> Result<Self> {
        Ok(Payment {
            id: r.id,
            student_id: r.student_id,
            external_order_id: r.external_order_id,
            external_payment_id: r.external_payment_id,
            amount: r.amount,
            currency: r.currency,
            status: r.status.parse().map_err(Error::Internal)?,
            method: r.method,
            refund_id: r.refund_id,
            refund_amount: r.refund_amount,
            refunded_at: r.refunded_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(FromRow)]
struct AttemptRow {
    id: Uuid,
    student_id: Uuid,
    attempt_number: i32,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    duration_seconds: Option<i32>,
    score: Option<Decimal>,
    percentage_score: Option<Decimal>,
    passed: Option<bool>,
    total_questions: i32,
    correct_answers: i32,
    wrong_answers: i32,
    unanswered_questions: i32,
    warnings_count: i32,
    status: String,
    answers: Option<JsonValue>,
    questions_snapshot: JsonValue,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AttemptRow> for TestAttempt {
    type Error = Error;

    fn try_from(r: AttemptRow) -> Result<Self> {
        Ok(TestAttempt {
            id: r.id,
            student_id: r.student_id,
            attempt_number: r.attempt_number,
            start_time: r.start_time,
            end_time: r.end_time,
            duration_seconds: r.duration_seconds,
            score: r.score,
            percentage_score: r.percentage_score,
            passed: r.passed,
            total_questions: r.total_questions,
            correct_answers: r.correct_answers,
            wrong_answers: r.wrong_answers,
            unanswered_questions: r.unanswered_questions,
            warnings_count: r.warnings_count,
            status: r.status.parse().map_err(Error::Internal)?,
            answers: r.answers,
            questions_snapshot: serde_json::from_value(r.questions_snapshot)?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

fn attempt_opt(row: Option<AttemptRow>) -> Result<Option<TestAttempt>> {
    row.map(TestAttempt::try_from).transpose()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl StudentRepository for PgStore {
    async fn create_student(&self, new: NewStudent) -> Result<Student> {
        let mut tx = self.pool.begin().await?;
        let student = sqlx::query_as::<_, Student>(
            r#"
            INSERT INTO students (id, email, password_hash, name, verification_token, verification_token_expires)
            VALUES ($1, LOWER($2), $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.name)
        .bind(&new.verification_token)
        .bind(new.verification_token_expires)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::Conflict("Email is already registered".to_string())
            } else {
                Error::from(e)
            }
        })?;
        refresh_status(&mut tx, student.id).await?;
        tx.commit().await?;
        Ok(student)
    }

    async fn find_student(&self, id: Uuid) -> Result<Option<Student>> {
        let row = sqlx::query_as::<_, Student>(r#"SELECT * FROM students WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Student>> {
        let row = sqlx::query_as::<_, Student>(r#"SELECT * FROM students WHERE email = LOWER($1)"#)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<Student>> {
        let row = sqlx::query_as::<_, Student>(
            r#"SELECT * FROM students WHERE verification_token = $1"#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<Student>> {
        let row = sqlx::query_as::<_, Student>(r#"SELECT * FROM students WHERE reset_token = $1"#)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Student> {
        let mut tx = self.pool.begin().await?;
        let mut student =
            sqlx::query_as::<_, Student>(r#"SELECT * FROM students WHERE id = $1 FOR UPDATE"#)
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Student {} not found", id)))?;
        apply_profile_update(&mut student, &update);

        let updated = sqlx::query_as::<_, Student>(
            r#"
            UPDATE students
            SET name = $2, phone = $3, college = $4, roll_number = $5, branch = $6, year = $7,
                profile_complete = $8, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&student.name)
        .bind(&student.phone)
        .bind(&student.college)
        .bind(&student.roll_number)
        .bind(&student.branch)
        .bind(student.year)
        .bind(student.profile_complete)
        .fetch_one(&mut *tx)
        .await?;
        refresh_status(&mut tx, id).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<Student> {
        let row = sqlx::query_as::<_, Student>(
            r#"UPDATE students SET active = $2, updated_at = NOW() WHERE id = $1 RETURNING *"#,
        )
        .bind(id)
        .bind(active)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| Error::NotFound(format!("Student {} not found", id)))
    }

    async fn record_login_failure(
        &self,
        id: Uuid,
        max_attempts: i32,
        lock_until: DateTime<Utc>,
    ) -> Result<Student> {
        let row = sqlx::query_as::<_, Student>(
            r#"
            UPDATE students
            SET lock_until = CASE WHEN login_attempts + 1 >= $2 THEN $3 ELSE lock_until END,
                login_attempts = CASE WHEN login_attempts + 1 >= $2 THEN 0 ELSE login_attempts + 1 END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(max_attempts)
        .bind(lock_until)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| Error::NotFound(format!("Student {} not found", id)))
    }

    async fn reset_login_failures(&self, id: Uuid) -> Result<()> {
        sqlx::query(r#"UPDATE students SET login_attempts = 0, lock_until = NULL WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_email_verified(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE students
            SET email_verified = TRUE, verification_token = NULL, verification_token_expires = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: Option<String>,
        expires: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(r#"UPDATE students SET reset_token = $2, reset_token_expires = $3 WHERE id = $1"#)
            .bind(id)
            .bind(token)
            .bind(expires)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE students
            SET password_hash = $2, reset_token = NULL, reset_token_expires = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TermsRepository for PgStore {
    async fn record_acceptance(&self, new: NewTermsAcceptance) -> Result<TermsAcceptance> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, TermsAcceptance>(
            r#"
            INSERT INTO terms_acceptances (id, student_id, terms_version, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.student_id)
        .bind(&new.terms_version)
        .bind(new.ip_address)
        .bind(&new.user_agent)
        .fetch_one(&mut *tx)
        .await?;
        refresh_status(&mut tx, new.student_id).await?;
        tx.commit().await?;
        Ok(row)
    }

    async fn list_acceptances(&self, student_id: Uuid) -> Result<Vec<TermsAcceptance>> {
        let rows = sqlx::query_as::<_, TermsAcceptance>(
            r#"SELECT * FROM terms_acceptances WHERE student_id = $1 ORDER BY accepted_at ASC"#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl PaymentRepository for PgStore {
    async fn create_payment(&self, new: NewPayment) -> Result<Payment> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            INSERT INTO payments (id, student_id, external_order_id, amount, currency, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.student_id)
        .bind(&new.external_order_id)
        .bind(new.amount)
        .bind(&new.currency)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"SELECT * FROM payments WHERE external_order_id = $1"#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Payment::try_from).transpose()
    }

    async fn list_payments(&self, student_id: Uuid) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            r#"SELECT * FROM payments WHERE student_id = $1 ORDER BY created_at DESC"#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn transition(
        &self,
        order_id: &str,
        expected: PaymentStatus,
        next: PaymentStatus,
        update: PaymentUpdate,
    ) -> Result<Option<Payment>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            UPDATE payments
            SET status = $3,
                external_payment_id = COALESCE($4, external_payment_id),
                method = COALESCE($5, method),
                refund_id = COALESCE($6, refund_id),
                refund_amount = COALESCE($7, refund_amount),
                refunded_at = COALESCE($8, refunded_at),
                updated_at = NOW()
            WHERE external_order_id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(update.external_payment_id)
        .bind(update.method)
        .bind(update.refund_id)
        .bind(update.refund_amount)
        .bind(update.refunded_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        refresh_status(&mut tx, row.student_id).await?;
        tx.commit().await?;
        Ok(Some(row.try_into()?))
    }
}

#[async_trait]
impl StatusRepository for PgStore {
    async fn get_status(&self, student_id: Uuid) -> Result<Option<StudentStatus>> {
        let row = sqlx::query_as::<_, StudentStatus>(
            r#"SELECT * FROM student_status WHERE student_id = $1"#,
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl AttemptRepository for PgStore {
    async fn eligibility_snapshot(&self, student_id: Uuid) -> Result<Option<EligibilitySnapshot>> {
        let mut conn = self.pool.acquire().await?;
        load_snapshot(&mut conn, student_id).await
    }

    async fn start_attempt(&self, new: NewAttempt, max_attempts: i64) -> Result<StartOutcome> {
        let mut tx = self.pool.begin().await?;

        // The projection row is the per-student lock for attempt creation.
        let locked = sqlx::query(r#"SELECT student_id FROM student_status WHERE student_id = $1 FOR UPDATE"#)
            .bind(new.student_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(Error::NotFound(format!("Student {} not found", new.student_id)));
        }

        let snapshot = load_snapshot(&mut tx, new.student_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Student {} not found", new.student_id)))?;
        if let Some(reason) = snapshot.decide(max_attempts).reason {
            return Ok(StartOutcome::Denied(reason));
        }

        let next_number: i32 = sqlx::query_scalar(
            r#"SELECT COALESCE(MAX(attempt_number), 0) + 1 FROM test_attempts WHERE student_id = $1"#,
        )
        .bind(new.student_id)
        .fetch_one(&mut *tx)
        .await?;

        let snapshot_json = serde_json::to_value(&new.questions_snapshot)?;
        let inserted = sqlx::query_as::<_, AttemptRow>(
            r#"
            INSERT INTO test_attempts (
                id, student_id, attempt_number, start_time, total_questions, status,
                questions_snapshot, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, 'in_progress', $6, $4, $4)
            RETURNING *
            "#,
        )
        .bind(new.id)
        .bind(new.student_id)
        .bind(next_number)
        .bind(new.start_time)
        .bind(new.questions_snapshot.len() as i32)
        .bind(snapshot_json)
        .fetch_one(&mut *tx)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(e) if is_unique_violation(&e) => {
                return Ok(StartOutcome::Denied(ReasonCode::AttemptInProgress))
            }
            Err(e) => return Err(e.into()),
        };
        tx.commit().await?;
        Ok(StartOutcome::Started(row.try_into()?))
    }

    async fn find_attempt(&self, id: Uuid) -> Result<Option<TestAttempt>> {
        let row = sqlx::query_as::<_, AttemptRow>(r#"SELECT * FROM test_attempts WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        attempt_opt(row)
    }

    async fn list_attempts(&self, student_id: Uuid) -> Result<Vec<TestAttempt>> {
        let rows = sqlx::query_as::<_, AttemptRow>(
            r#"SELECT * FROM test_attempts WHERE student_id = $1 ORDER BY attempt_number ASC"#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TestAttempt::try_from).collect()
    }

    async fn finalize(&self, id: Uuid, fin: AttemptFinalization) -> Result<Option<TestAttempt>> {
        let grade = fin.grade.as_ref();
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            UPDATE test_attempts
            SET status = $2,
                end_time = $3,
                duration_seconds = $4,
                score = COALESCE($5, score),
                percentage_score = COALESCE($6, percentage_score),
                passed = COALESCE($7, passed),
                correct_answers = COALESCE($8, correct_answers),
                wrong_answers = COALESCE($9, wrong_answers),
                unanswered_questions = COALESCE($10, unanswered_questions),
                answers = COALESCE($11, answers),
                updated_at = $3
            WHERE id = $1 AND status = 'in_progress'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(fin.status.as_str())
        .bind(fin.end_time)
        .bind(fin.duration_seconds)
        .bind(grade.map(|g| g.score))
        .bind(grade.map(|g| g.percentage_score))
        .bind(grade.map(|g| g.passed))
        .bind(grade.map(|g| g.correct_answers))
        .bind(grade.map(|g| g.wrong_answers))
        .bind(grade.map(|g| g.unanswered_questions))
        .bind(fin.answers.clone())
        .fetch_optional(&self.pool)
        .await?;
        attempt_opt(row)
    }

    async fn record_warning(
        &self,
        id: Uuid,
        threshold: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<TestAttempt>> {
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            UPDATE test_attempts
            SET warnings_count = warnings_count + 1,
                status = CASE WHEN warnings_count + 1 > $2 THEN 'disqualified' ELSE status END,
                end_time = CASE WHEN warnings_count + 1 > $2 THEN $3 ELSE end_time END,
                duration_seconds = CASE
                    WHEN warnings_count + 1 > $2
                    THEN GREATEST(0, FLOOR(EXTRACT(EPOCH FROM ($3 - start_time))))::integer
                    ELSE duration_seconds END,
                updated_at = $3
            WHERE id = $1 AND status = 'in_progress'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(threshold)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        attempt_opt(row)
    }

    async fn list_in_progress_started_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<TestAttempt>> {
        let rows = sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT * FROM test_attempts
            WHERE status = 'in_progress' AND start_time < $1
            ORDER BY start_time ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TestAttempt::try_from).collect()
    }

    async fn update_grade(&self, id: Uuid, grade: AttemptGrade) -> Result<Option<TestAttempt>> {
        let row = sqlx::query_as::<_, AttemptRow>(
            r#"
            UPDATE test_attempts
            SET score = $2, percentage_score = $3, passed = $4,
                correct_answers = $5, wrong_answers = $6, unanswered_questions = $7,
                updated_at = NOW()
            WHERE id = $1 AND status = 'completed'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(grade.score)
        .bind(grade.percentage_score)
        .bind(grade.passed)
        .bind(grade.correct_answers)
        .bind(grade.wrong_answers)
        .bind(grade.unanswered_questions)
        .fetch_optional(&self.pool)
        .await?;
        attempt_opt(row)
    }
}

#[async_trait]
impl QuestionRepository for PgStore {
    async fn list_active_questions(&self) -> Result<Vec<Question>> {
        let rows = sqlx::query_as::<_, Question>(
            r#"SELECT id, question, options, correct_option, active FROM questions WHERE active ORDER BY id"#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn find_questions(&self, ids: &[i32]) -> Result<Vec<Question>> {
        let rows = sqlx::query_as::<_, Question>(
            r#"SELECT id, question, options, correct_option, active FROM questions WHERE id = ANY($1) ORDER BY id"#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn upsert_questions(&self, questions: Vec<Question>) -> Result<Vec<Question>> {
        let mut tx = self.pool.begin().await?;
        let mut saved = Vec::with_capacity(questions.len());
        for question in &questions {
            let row = sqlx::query_as::<_, Question>(
                r#"
                INSERT INTO questions (id, question, options, correct_option, active)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO UPDATE SET
                    question = EXCLUDED.question,
                    options = EXCLUDED.options,
                    correct_option = EXCLUDED.correct_option,
                    active = EXCLUDED.active,
                    updated_at = NOW()
                RETURNING id, question, options, correct_option, active
                "#,
            )
            .bind(question.id)
            .bind(&question.question)
            .bind(&question.options)
            .bind(question.correct_option)
            .bind(question.active)
            .fetch_one(&mut *tx)
            .await?;
            saved.push(row);
        }
        tx.commit().await?;
        Ok(saved)
    }
}
