use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::question::Question;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
    Abandoned,
    Disqualified,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Abandoned => "abandoned",
            AttemptStatus::Disqualified => "disqualified",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptStatus::InProgress)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(AttemptStatus::InProgress),
            "completed" => Ok(AttemptStatus::Completed),
            "abandoned" => Ok(AttemptStatus::Abandoned),
            "disqualified" => Ok(AttemptStatus::Disqualified),
            other => Err(format!("unknown attempt status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestAttempt {
    pub id: Uuid,
    pub student_id: Uuid,
    pub attempt_number: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i32>,
    pub score: Option<Decimal>,
    pub percentage_score: Option<Decimal>,
    pub passed: Option<bool>,
    pub total_questions: i32,
    pub correct_answers: i32,
    pub wrong_answers: i32,
    pub unanswered_questions: i32,
    pub warnings_count: i32,
    pub status: AttemptStatus,
    pub answers: Option<JsonValue>,
    #[serde(skip_serializing)]
    pub questions_snapshot: Vec<Question>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub id: Uuid,
    pub student_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub questions_snapshot: Vec<Question>,
}

/// Everything written when an in-progress attempt reaches a terminal state.
#[derive(Debug, Clone)]
pub struct AttemptFinalization {
    pub status: AttemptStatus,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: i32,
    pub grade: Option<AttemptGrade>,
    pub answers: Option<JsonValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptGrade {
    pub score: Decimal,
    pub percentage_score: Decimal,
    pub passed: bool,
    pub correct_answers: i32,
    pub wrong_answers: i32,
    pub unanswered_questions: i32,
}

impl TestAttempt {
    pub fn from_new(new: NewAttempt, attempt_number: i32) -> Self {
        Self {
            id: new.id,
            student_id: new.student_id,
            attempt_number,
            start_time: new.start_time,
            end_time: None,
            duration_seconds: None,
            score: None,
            percentage_score: None,
            passed: None,
            total_questions: new.questions_snapshot.len() as i32,
            correct_answers: 0,
            wrong_answers: 0,
            unanswered_questions: 0,
            warnings_count: 0,
            status: AttemptStatus::InProgress,
            answers: None,
            questions_snapshot: new.questions_snapshot,
            created_at: new.start_time,
            updated_at: new.start_time,
        }
    }

    pub fn apply_grade(&mut self, grade: &AttemptGrade) {
        self.score = Some(grade.score);
        self.percentage_score = Some(grade.percentage_score);
        self.passed = Some(grade.passed);
        self.correct_answers = grade.correct_answers;
        self.wrong_answers = grade.wrong_answers;
        self.unanswered_questions = grade.unanswered_questions;
    }

    pub fn apply_finalization(&mut self, fin: &AttemptFinalization) {
        self.status = fin.status;
        self.end_time = Some(fin.end_time);
        self.duration_seconds = Some(fin.duration_seconds);
        if let Some(grade) = &fin.grade {
            self.apply_grade(grade);
        }
        if fin.answers.is_some() {
            self.answers = fin.answers.clone();
        }
        self.updated_at = fin.end_time;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_in_progress_is_open() {
        assert!(!AttemptStatus::InProgress.is_terminal());
        assert!(AttemptStatus::Completed.is_terminal());
        assert!(AttemptStatus::Abandoned.is_terminal());
        assert!(AttemptStatus::Disqualified.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case() {
        let v = serde_json::to_value(AttemptStatus::InProgress).unwrap();
        assert_eq!(v, "in_progress");
        assert_eq!(
            "disqualified".parse::<AttemptStatus>().unwrap(),
            AttemptStatus::Disqualified
        );
    }
}
