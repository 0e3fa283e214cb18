use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::repository::{Repositories, StartOutcome};
use crate::error::{Error, Result};
use crate::models::answer::Answer;
use crate::models::eligibility::ReasonCode;
use crate::models::question::Question;
use crate::models::test_attempt::{AttemptFinalization, AttemptStatus, NewAttempt, TestAttempt};
use crate::services::eligibility_service::EligibilityService;
use crate::services::grading_service::{GradingService, ScoringPolicy};
use crate::services::notification_service::{NotificationDispatcher, NotificationEvent};
use crate::utils::time::{seconds_between, Clock};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttemptPolicy {
    pub max_attempts: i64,
    /// Warnings tolerated; the next one disqualifies.
    pub warning_threshold: i32,
    pub duration: Duration,
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            warning_threshold: 3,
            duration: Duration::minutes(30),
        }
    }
}

/// Drives attempts through `in_progress -> completed | abandoned | disqualified`.
/// Every transition out of `in_progress` is a compare-and-swap in the store,
/// so a submit racing the sweeper has exactly one winner.
#[derive(Clone)]
pub struct AttemptService {
    repos: Repositories,
    gate: EligibilityService,
    notifier: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    policy: AttemptPolicy,
    scoring: ScoringPolicy,
}

impl AttemptService {
    pub fn new(
        repos: Repositories,
        gate: EligibilityService,
        notifier: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        policy: AttemptPolicy,
        scoring: ScoringPolicy,
    ) -> Self {
        Self {
            repos,
            gate,
            notifier,
            clock,
            policy,
            scoring,
        }
    }

    pub fn policy(&self) -> &AttemptPolicy {
        &self.policy
    }

    /// Opens a new attempt. A student who already has one open gets
    /// `Error::AttemptInProgress` whether the gate or the store saw it first.
    pub async fn start_attempt(&self, student_id: Uuid) -> Result<TestAttempt> {
        match self.gate.ensure_can_start(student_id).await {
            Err(Error::Ineligible(ReasonCode::AttemptInProgress)) => {
                return Err(Error::AttemptInProgress)
            }
            other => other?,
        }

        let mut questions = self.repos.questions.list_active_questions().await?;
        if questions.is_empty() {
            return Err(Error::Validation("No active questions are available".to_string()));
        }
        questions.sort_by_key(|q| q.id);

        let new = NewAttempt {
            id: Uuid::new_v4(),
            student_id,
            start_time: self.clock.now(),
            questions_snapshot: questions,
        };

        match self
            .repos
            .attempts
            .start_attempt(new, self.policy.max_attempts)
            .await?
        {
            StartOutcome::Started(attempt) => {
                tracing::info!(
                    student_id = %student_id,
                    attempt_id = %attempt.id,
                    attempt_number = attempt.attempt_number,
                    "Attempt started"
                );
                Ok(attempt)
            }
            StartOutcome::Denied(ReasonCode::AttemptInProgress) => Err(Error::AttemptInProgress),
            StartOutcome::Denied(reason) => Err(Error::Ineligible(reason)),
        }
    }

    pub async fn get_attempt(&self, attempt_id: Uuid) -> Result<TestAttempt> {
        self.repos
            .attempts
            .find_attempt(attempt_id)
            .await?
            .ok_or_else(|| Error::NotFound("Attempt not found".to_string()))
    }

    /// Like [`Self::get_attempt`], but other students' attempts look absent.
    pub async fn get_owned_attempt(&self, student_id: Uuid, attempt_id: Uuid) -> Result<TestAttempt> {
        let attempt = self.get_attempt(attempt_id).await?;
        if attempt.student_id != student_id {
            return Err(Error::NotFound("Attempt not found".to_string()));
        }
        Ok(attempt)
    }

    pub async fn list_attempts(&self, student_id: Uuid) -> Result<Vec<TestAttempt>> {
        self.repos.attempts.list_attempts(student_id).await
    }

    pub async fn questions_for_attempt(&self, student_id: Uuid, attempt_id: Uuid) -> Result<Vec<Question>> {
        let attempt = self.get_owned_attempt(student_id, attempt_id).await?;
        if attempt.status.is_terminal() {
            return Err(Error::InvalidState(format!("Attempt is {}", attempt.status)));
        }
        Ok(attempt.questions_snapshot)
    }

    /// Seconds left before the attempt is overdue; zero for finished attempts.
    pub fn time_remaining(&self, attempt: &TestAttempt) -> i64 {
        if attempt.status.is_terminal() {
            return 0;
        }
        let deadline = attempt.start_time + self.policy.duration;
        (deadline - self.clock.now()).num_seconds().max(0)
    }

    fn is_overdue(&self, attempt: &TestAttempt, now: DateTime<Utc>) -> bool {
        now - attempt.start_time > self.policy.duration
    }

    pub async fn record_warning(&self, student_id: Uuid, attempt_id: Uuid) -> Result<TestAttempt> {
        let attempt = self.get_owned_attempt(student_id, attempt_id).await?;
        let now = self.clock.now();
        if !attempt.status.is_terminal() && self.is_overdue(&attempt, now) {
            self.expire_if_overdue(attempt_id, now).await?;
            return Err(Error::InvalidState("Attempt time has expired".to_string()));
        }

        let updated = self
            .repos
            .attempts
            .record_warning(attempt_id, self.policy.warning_threshold, now)
            .await?
            .ok_or_else(|| Error::InvalidState("Attempt is no longer in progress".to_string()))?;

        if updated.status == AttemptStatus::Disqualified {
            tracing::warn!(
                attempt_id = %attempt_id,
                warnings = updated.warnings_count,
                "Attempt disqualified after repeated warnings"
            );
            if let Some(student) = self.repos.students.find_student(student_id).await? {
                self.notifier.dispatch(NotificationEvent::AttemptDisqualified {
                    email: student.email.clone(),
                    attempt_id,
                    warnings_count: updated.warnings_count,
                });
                self.notifier.dispatch(NotificationEvent::SecurityAlert {
                    email: student.email,
                    reason: format!(
                        "Attempt {} disqualified after {} warnings",
                        updated.attempt_number, updated.warnings_count
                    ),
                });
            }
        } else {
            tracing::info!(attempt_id = %attempt_id, warnings = updated.warnings_count, "Warning recorded");
        }
        Ok(updated)
    }

    pub async fn submit_answers(
        &self,
        student_id: Uuid,
        attempt_id: Uuid,
        answers: Vec<Answer>,
    ) -> Result<TestAttempt> {
        let attempt = self.get_owned_attempt(student_id, attempt_id).await?;
        if attempt.status.is_terminal() {
            return Err(Error::InvalidState(format!("Attempt is already {}", attempt.status)));
        }
        let now = self.clock.now();
        if self.is_overdue(&attempt, now) {
            self.expire_if_overdue(attempt_id, now).await?;
            return Err(Error::InvalidState("Attempt time has expired".to_string()));
        }

        let known: HashSet<i32> = attempt.questions_snapshot.iter().map(|q| q.id).collect();
        let mut seen = HashSet::new();
        for answer in &answers {
            if !known.contains(&answer.question_id) {
                return Err(Error::Validation(format!(
                    "Question {} is not part of this attempt",
                    answer.question_id
                )));
            }
            if !seen.insert(answer.question_id) {
                return Err(Error::Validation(format!(
                    "Question {} was answered more than once",
                    answer.question_id
                )));
            }
        }

        let result = GradingService::score(&answers, &attempt.questions_snapshot, &self.scoring);
        let fin = AttemptFinalization {
            status: AttemptStatus::Completed,
            end_time: now,
            duration_seconds: seconds_between(attempt.start_time, now),
            grade: Some(result.to_grade()),
            answers: Some(serde_json::to_value(&answers)?),
        };

        let completed = self
            .repos
            .attempts
            .finalize(attempt_id, fin)
            .await?
            .ok_or_else(|| Error::InvalidState("Attempt is no longer in progress".to_string()))?;

        tracing::info!(
            attempt_id = %attempt_id,
            correct = result.correct,
            percentage = result.percentage_score,
            passed = result.passed,
            "Attempt submitted"
        );
        if let Some(student) = self.repos.students.find_student(student_id).await? {
            self.notifier.dispatch(NotificationEvent::TestCompleted {
                email: student.email,
                attempt_id,
                attempt_number: completed.attempt_number,
                percentage_score: completed.percentage_score.unwrap_or_default(),
                passed: completed.passed.unwrap_or(false),
            });
        }
        Ok(completed)
    }

    /// Abandons the attempt if its time ran out before `now`. The recorded
    /// end time is the deadline, not the moment the expiry was noticed.
    pub async fn expire_if_overdue(&self, attempt_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let attempt = self.get_attempt(attempt_id).await?;
        if attempt.status.is_terminal() {
            return Err(Error::InvalidState(format!("Attempt is {}", attempt.status)));
        }
        if !self.is_overdue(&attempt, now) {
            return Ok(false);
        }

        let fin = AttemptFinalization {
            status: AttemptStatus::Abandoned,
            end_time: attempt.start_time + self.policy.duration,
            duration_seconds: self.policy.duration.num_seconds() as i32,
            grade: None,
            answers: None,
        };
        match self.repos.attempts.finalize(attempt_id, fin).await? {
            Some(_) => {
                tracing::info!(attempt_id = %attempt_id, "Overdue attempt abandoned");
                Ok(true)
            }
            None => Err(Error::InvalidState("Attempt is no longer in progress".to_string())),
        }
    }

    /// One pass of the background expiry loop. Returns how many attempts
    /// were abandoned.
    pub async fn sweep_overdue(&self) -> Result<usize> {
        let now = self.clock.now();
        let cutoff = now - self.policy.duration;
        let candidates = self.repos.attempts.list_in_progress_started_before(cutoff).await?;

        let mut expired = 0;
        for attempt in candidates {
            match self.expire_if_overdue(attempt.id, now).await {
                Ok(true) => expired += 1,
                Ok(false) | Err(Error::InvalidState(_)) => {}
                Err(e) => {
                    tracing::error!(attempt_id = %attempt.id, error = %e, "Failed to expire attempt");
                }
            }
        }
        if expired > 0 {
            tracing::info!(expired, "Sweep abandoned overdue attempts");
        }
        Ok(expired)
    }

    /// Re-scores a completed attempt against the current bank versions of
    /// the questions it was given.
    pub async fn regrade_attempt(&self, attempt_id: Uuid) -> Result<TestAttempt> {
        let attempt = self.get_attempt(attempt_id).await?;
        if attempt.status != AttemptStatus::Completed {
            return Err(Error::InvalidState(format!(
                "Only completed attempts can be regraded, this one is {}",
                attempt.status
            )));
        }

        let ids: Vec<i32> = attempt.questions_snapshot.iter().map(|q| q.id).collect();
        let current = self.repos.questions.find_questions(&ids).await?;
        // Questions removed from the bank keep their snapshotted version.
        let bank: Vec<Question> = attempt
            .questions_snapshot
            .iter()
            .map(|snap| {
                current
                    .iter()
                    .find(|q| q.id == snap.id)
                    .cloned()
                    .unwrap_or_else(|| snap.clone())
            })
            .collect();

        let answers: Vec<Answer> = match &attempt.answers {
            Some(raw) => serde_json::from_value(raw.clone())?,
            None => Vec::new(),
        };
        let result = GradingService::score(&answers, &bank, &self.scoring);

        let updated = self
            .repos
            .attempts
            .update_grade(attempt_id, result.to_grade())
            .await?
            .ok_or_else(|| Error::InvalidState("Attempt is no longer completed".to_string()))?;
        tracing::info!(attempt_id = %attempt_id, percentage = result.percentage_score, "Attempt regraded");
        Ok(updated)
    }
}
