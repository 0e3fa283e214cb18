use serde::Deserialize;
use validator::Validate;

use crate::models::student::ProfileUpdate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(min = 7, max = 20))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub college: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub roll_number: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub branch: Option<String>,
    #[validate(range(min = 1, max = 6))]
    pub year: Option<i32>,
}

impl From<UpdateProfileRequest> for ProfileUpdate {
    fn from(req: UpdateProfileRequest) -> Self {
        Self {
            name: req.name,
            phone: req.phone,
            college: req.college,
            roll_number: req.roll_number,
            branch: req.branch,
            year: req.year,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcceptTermsRequest {
    /// Must be `true`; an explicit opt-in.
    pub accepted: bool,
}
