use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::answer::Answer;
use crate::models::question::PublicQuestion;
use crate::models::test_attempt::TestAttempt;

#[derive(Debug, Clone, Serialize)]
pub struct AttemptResponse {
    #[serde(flatten)]
    pub attempt: TestAttempt,
    pub time_remaining_seconds: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartAttemptResponse {
    pub attempt_id: Uuid,
    pub attempt_number: i32,
    pub start_time: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub questions: Vec<PublicQuestion>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptQuestionsResponse {
    pub attempt_id: Uuid,
    pub time_remaining_seconds: i64,
    pub questions: Vec<PublicQuestion>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitAnswersRequest {
    #[validate(length(max = 1000))]
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct WarningRequest {
    #[validate(length(max = 100))]
    pub kind: Option<String>,
}
