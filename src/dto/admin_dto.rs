use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::question::Question;

#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_correct_option"))]
pub struct UpsertQuestionRequest {
    #[validate(range(min = 1))]
    pub id: i32,
    #[validate(length(min = 1))]
    pub question: String,
    #[validate(length(min = 2, max = 10))]
    pub options: Vec<String>,
    pub correct_option: i32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

fn validate_correct_option(req: &UpsertQuestionRequest) -> Result<(), ValidationError> {
    if req.correct_option < 0 || req.correct_option as usize >= req.options.len() {
        return Err(ValidationError::new("correct_option_out_of_range"));
    }
    Ok(())
}

impl From<UpsertQuestionRequest> for Question {
    fn from(req: UpsertQuestionRequest) -> Self {
        Self {
            id: req.id,
            question: req.question,
            options: req.options,
            correct_option: req.correct_option,
            active: req.active,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepResponse {
    pub expired: usize,
}
