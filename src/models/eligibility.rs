use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a student may not start an attempt. Variants are declared in the
/// order the gate checks them; the first failing check wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    AccountInactive,
    TermsNotAccepted,
    PaymentNotCompleted,
    ProfileIncomplete,
    AttemptInProgress,
    AttemptLimitReached,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::AccountInactive => "ACCOUNT_INACTIVE",
            ReasonCode::TermsNotAccepted => "TERMS_NOT_ACCEPTED",
            ReasonCode::PaymentNotCompleted => "PAYMENT_NOT_COMPLETED",
            ReasonCode::ProfileIncomplete => "PROFILE_INCOMPLETE",
            ReasonCode::AttemptInProgress => "ATTEMPT_IN_PROGRESS",
            ReasonCode::AttemptLimitReached => "ATTEMPT_LIMIT_REACHED",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
}

impl Eligibility {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn denied(reason: ReasonCode) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Everything the gate needs to decide, read in one pass from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilitySnapshot {
    pub active: bool,
    pub terms_accepted: bool,
    pub payment_completed: bool,
    pub profile_complete: bool,
    pub has_in_progress: bool,
    pub attempt_count: i64,
}

impl EligibilitySnapshot {
    pub fn decide(&self, max_attempts: i64) -> Eligibility {
        let checks = [
            (self.active, ReasonCode::AccountInactive),
            (self.terms_accepted, ReasonCode::TermsNotAccepted),
            (self.payment_completed, ReasonCode::PaymentNotCompleted),
            (self.profile_complete, ReasonCode::ProfileIncomplete),
            (!self.has_in_progress, ReasonCode::AttemptInProgress),
            (self.attempt_count < max_attempts, ReasonCode::AttemptLimitReached),
        ];

        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, reason)) => Eligibility::denied(*reason),
            None => Eligibility::allowed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> EligibilitySnapshot {
        EligibilitySnapshot {
            active: true,
            terms_accepted: true,
            payment_completed: true,
            profile_complete: true,
            has_in_progress: false,
            attempt_count: 0,
        }
    }

    #[test]
    fn fully_prepared_student_is_allowed() {
        assert_eq!(ready().decide(1), Eligibility::allowed());
    }

    #[test]
    fn terms_outrank_payment() {
        let snapshot = EligibilitySnapshot {
            terms_accepted: false,
            payment_completed: false,
            ..ready()
        };
        assert_eq!(
            snapshot.decide(1).reason,
            Some(ReasonCode::TermsNotAccepted)
        );
    }

    #[test]
    fn inactive_account_outranks_everything() {
        let snapshot = EligibilitySnapshot {
            active: false,
            terms_accepted: false,
            payment_completed: false,
            profile_complete: false,
            has_in_progress: true,
            attempt_count: 9,
        };
        assert_eq!(snapshot.decide(1).reason, Some(ReasonCode::AccountInactive));
    }

    #[test]
    fn in_progress_outranks_limit() {
        let snapshot = EligibilitySnapshot {
            has_in_progress: true,
            attempt_count: 1,
            ..ready()
        };
        assert_eq!(
            snapshot.decide(1).reason,
            Some(ReasonCode::AttemptInProgress)
        );
    }

    #[test]
    fn limit_is_configurable() {
        let snapshot = EligibilitySnapshot {
            attempt_count: 1,
            ..ready()
        };
        assert_eq!(
            snapshot.decide(1).reason,
            Some(ReasonCode::AttemptLimitReached)
        );
        assert!(snapshot.decide(2).allowed);
    }

    #[test]
    fn reason_serializes_as_code() {
        let json = serde_json::to_value(Eligibility::denied(ReasonCode::ProfileIncomplete)).unwrap();
        assert_eq!(json["reason"], "PROFILE_INCOMPLETE");
        assert_eq!(json["allowed"], false);
    }
}
