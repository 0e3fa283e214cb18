use std::sync::Arc;
use uuid::Uuid;

use crate::database::repository::AttemptRepository;
use crate::error::{Error, Result};
use crate::models::eligibility::{Eligibility, ReasonCode};
use crate::services::payment_service::PaymentLedger;

/// Decides whether a student may start a new attempt right now.
///
/// Reads the account, the status projection and attempt history in one
/// snapshot, then asks the payment ledger for the authoritative payment
/// state. An unreachable ledger denies with `PAYMENT_NOT_COMPLETED`.
#[derive(Clone)]
pub struct EligibilityService {
    attempts: Arc<dyn AttemptRepository>,
    ledger: Arc<dyn PaymentLedger>,
    max_attempts: i64,
}

impl EligibilityService {
    pub fn new(
        attempts: Arc<dyn AttemptRepository>,
        ledger: Arc<dyn PaymentLedger>,
        max_attempts: i64,
    ) -> Self {
        Self {
            attempts,
            ledger,
            max_attempts,
        }
    }

    pub async fn can_start_attempt(&self, student_id: Uuid) -> Result<Eligibility> {
        let mut snapshot = self
            .attempts
            .eligibility_snapshot(student_id)
            .await?
            .ok_or_else(|| Error::NotFound("Student not found".to_string()))?;

        snapshot.payment_completed = match self.ledger.is_payment_completed(student_id).await {
            Ok(paid) => paid,
            Err(e) => {
                tracing::error!(student_id = %student_id, error = %e, "Payment ledger unavailable, denying start");
                false
            }
        };

        let decision = snapshot.decide(self.max_attempts);
        if let Some(reason) = decision.reason {
            tracing::debug!(student_id = %student_id, reason = %reason, "Attempt start denied");
        }
        Ok(decision)
    }

    /// Same as [`Self::can_start_attempt`] but turns a denial into an error.
    pub async fn ensure_can_start(&self, student_id: Uuid) -> Result<()> {
        let decision = self.can_start_attempt(student_id).await?;
        match decision.reason {
            Some(reason) => Err(Error::Ineligible(reason)),
            None => Ok(()),
        }
    }
}

pub fn reason_message(reason: ReasonCode) -> &'static str {
    match reason {
        ReasonCode::AccountInactive => "Account is inactive",
        ReasonCode::TermsNotAccepted => "Terms and conditions have not been accepted",
        ReasonCode::PaymentNotCompleted => "Test fee payment is not completed",
        ReasonCode::ProfileIncomplete => "Profile is incomplete",
        ReasonCode::AttemptInProgress => "An attempt is already in progress",
        ReasonCode::AttemptLimitReached => "Maximum number of attempts reached",
    }
}
