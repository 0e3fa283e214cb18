use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Student {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub college: Option<String>,
    pub roll_number: Option<String>,
    pub branch: Option<String>,
    pub year: Option<i32>,
    pub profile_complete: bool,
    pub email_verified: bool,
    pub active: bool,
    pub login_attempts: i32,
    pub lock_until: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub reset_token_expires: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub verification_token: Option<String>,
    #[serde(skip_serializing)]
    pub verification_token_expires: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Student {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.lock_until.map(|until| until > now).unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct NewStudent {
    pub email: String,
    pub password_hash: String,
    pub name: Option<String>,
    pub verification_token: String,
    pub verification_token_expires: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub college: Option<String>,
    pub roll_number: Option<String>,
    pub branch: Option<String>,
    pub year: Option<i32>,
}

/// Applies a partial update; `None` leaves the field untouched.
pub fn apply_profile_update(student: &mut Student, update: &ProfileUpdate) {
    fn merge(target: &mut Option<String>, value: &Option<String>) {
        if let Some(v) = value {
            *target = Some(v.trim().to_string());
        }
    }
    merge(&mut student.name, &update.name);
    merge(&mut student.phone, &update.phone);
    merge(&mut student.college, &update.college);
    merge(&mut student.roll_number, &update.roll_number);
    merge(&mut student.branch, &update.branch);
    if update.year.is_some() {
        student.year = update.year;
    }
    student.profile_complete = is_profile_complete(student);
}

pub fn is_profile_complete(student: &Student) -> bool {
    let filled = |v: &Option<String>| v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false);
    filled(&student.name)
        && filled(&student.phone)
        && filled(&student.college)
        && filled(&student.roll_number)
        && filled(&student.branch)
        && student.year.is_some()
}
