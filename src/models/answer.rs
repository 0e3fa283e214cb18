use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: i32,
    /// Index into the question's options; `None` means skipped.
    pub selected: Option<i32>,
}
