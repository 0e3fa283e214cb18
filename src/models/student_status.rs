use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Cached gate state. Only ever produced by [`StudentStatus::derive`] or the
/// equivalent refresh query; `can_access_tests` is never written on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StudentStatus {
    pub student_id: Uuid,
    pub terms_accepted: bool,
    pub payment_completed: bool,
    pub profile_complete: bool,
    pub can_access_tests: bool,
    pub updated_at: DateTime<Utc>,
}

impl StudentStatus {
    pub fn derive(
        student_id: Uuid,
        terms_accepted: bool,
        payment_completed: bool,
        profile_complete: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            student_id,
            terms_accepted,
            payment_completed,
            profile_complete,
            can_access_tests: terms_accepted && payment_completed && profile_complete,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_requires_all_three_flags() {
        let id = Uuid::new_v4();
        let now = Utc::now();
        assert!(StudentStatus::derive(id, true, true, true, now).can_access_tests);
        assert!(!StudentStatus::derive(id, false, true, true, now).can_access_tests);
        assert!(!StudentStatus::derive(id, true, false, true, now).can_access_tests);
        assert!(!StudentStatus::derive(id, true, true, false, now).can_access_tests);
    }
}
