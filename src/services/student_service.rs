use chrono::Duration;
use sqlx::types::ipnetwork::IpNetwork;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::repository::{StatusRepository, StudentRepository, TermsRepository};
use crate::error::{Error, Result};
use crate::middleware::auth::{JwtKeys, ROLE_ADMIN, ROLE_STUDENT};
use crate::models::student::{NewStudent, ProfileUpdate, Student};
use crate::models::student_status::StudentStatus;
use crate::models::terms_acceptance::{NewTermsAcceptance, TermsAcceptance};
use crate::services::notification_service::{NotificationDispatcher, NotificationEvent};
use crate::utils::crypto::{hash_password, verify_password};
use crate::utils::time::Clock;
use crate::utils::token::generate_token;

const TOKEN_LENGTH: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LockoutPolicy {
    pub max_login_attempts: i32,
    pub lockout: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_login_attempts: 5,
            lockout: Duration::minutes(15),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccountSettings {
    pub terms_version: String,
    pub admin_emails: Vec<String>,
    pub lockout: LockoutPolicy,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub token: String,
    pub role: &'static str,
    pub student: Student,
}

#[derive(Clone)]
pub struct StudentService {
    students: Arc<dyn StudentRepository>,
    terms: Arc<dyn TermsRepository>,
    statuses: Arc<dyn StatusRepository>,
    notifier: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    jwt: JwtKeys,
    settings: AccountSettings,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn password_error(e: argon2::password_hash::Error) -> Error {
    Error::Internal(format!("Password hashing failed: {}", e))
}

impl StudentService {
    pub fn new(
        students: Arc<dyn StudentRepository>,
        terms: Arc<dyn TermsRepository>,
        statuses: Arc<dyn StatusRepository>,
        notifier: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        jwt: JwtKeys,
        settings: AccountSettings,
    ) -> Self {
        Self {
            students,
            terms,
            statuses,
            notifier,
            clock,
            jwt,
            settings,
        }
    }

    pub async fn register(&self, email: &str, password: &str, name: Option<String>) -> Result<Student> {
        let email = normalize_email(email);
        let password_hash = hash_password(password).map_err(password_error)?;
        let verification_token = generate_token(TOKEN_LENGTH);

        let student = self
            .students
            .create_student(NewStudent {
                email: email.clone(),
                password_hash,
                name: name.clone(),
                verification_token: verification_token.clone(),
                verification_token_expires: self.clock.now() + Duration::hours(24),
            })
            .await?;

        tracing::info!(student_id = %student.id, "Student registered");
        self.notifier.dispatch(NotificationEvent::Welcome {
            email: email.clone(),
            name,
        });
        self.notifier.dispatch(NotificationEvent::EmailVerification {
            email,
            token: verification_token,
        });
        Ok(student)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResult> {
        let email = normalize_email(email);
        let now = self.clock.now();
        let student = self
            .students
            .find_by_email(&email)
            .await?
            .ok_or_else(|| Error::Unauthorized("Invalid email or password".to_string()))?;

        if !student.active {
            return Err(Error::Forbidden("Account is inactive".to_string()));
        }
        if student.is_locked(now) {
            return Err(Error::Unauthorized(
                "Account is temporarily locked after repeated failed logins".to_string(),
            ));
        }

        let valid = verify_password(password, &student.password_hash).map_err(password_error)?;
        if !valid {
            let lockout = self.settings.lockout;
            let updated = self
                .students
                .record_login_failure(student.id, lockout.max_login_attempts, now + lockout.lockout)
                .await?;
            if updated.is_locked(now) {
                tracing::warn!(student_id = %student.id, "Account locked after failed logins");
                self.notifier.dispatch(NotificationEvent::SecurityAlert {
                    email: updated.email,
                    reason: "Account locked after repeated failed login attempts".to_string(),
                });
            }
            return Err(Error::Unauthorized("Invalid email or password".to_string()));
        }

        if student.login_attempts > 0 || student.lock_until.is_some() {
            self.students.reset_login_failures(student.id).await?;
        }

        let role = if self.settings.admin_emails.iter().any(|a| a == &student.email) {
            ROLE_ADMIN
        } else {
            ROLE_STUDENT
        };
        let token = self.jwt.issue(student.id, role, now)?;
        tracing::info!(student_id = %student.id, role, "Login succeeded");
        Ok(LoginResult {
            token,
            role,
            student,
        })
    }

    pub async fn verify_email(&self, token: &str) -> Result<()> {
        let student = self
            .students
            .find_by_verification_token(token)
            .await?
            .ok_or_else(|| Error::NotFound("Invalid verification token".to_string()))?;
        match student.verification_token_expires {
            Some(expires) if expires >= self.clock.now() => {}
            _ => return Err(Error::Validation("Verification token has expired".to_string())),
        }
        self.students.mark_email_verified(student.id).await?;
        tracing::info!(student_id = %student.id, "Email verified");
        Ok(())
    }

    /// Always succeeds, whether or not the email is registered.
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        let Some(student) = self.students.find_by_email(&email).await? else {
            return Ok(());
        };
        if !student.active {
            return Ok(());
        }
        let token = generate_token(TOKEN_LENGTH);
        self.students
            .set_reset_token(
                student.id,
                Some(token.clone()),
                Some(self.clock.now() + Duration::hours(1)),
            )
            .await?;
        self.notifier.dispatch(NotificationEvent::PasswordReset {
            email: student.email,
            token,
        });
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        let invalid = || Error::Validation("Invalid or expired reset token".to_string());
        let student = self
            .students
            .find_by_reset_token(token)
            .await?
            .ok_or_else(invalid)?;
        match student.reset_token_expires {
            Some(expires) if expires >= self.clock.now() => {}
            _ => return Err(invalid()),
        }
        let hash = hash_password(new_password).map_err(password_error)?;
        self.students.set_password(student.id, &hash).await?;
        self.students.reset_login_failures(student.id).await?;
        tracing::info!(student_id = %student.id, "Password reset");
        Ok(())
    }

    pub async fn get_student(&self, id: Uuid) -> Result<Student> {
        self.students
            .find_student(id)
            .await?
            .ok_or_else(|| Error::NotFound("Student not found".to_string()))
    }

    pub async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Student> {
        let student = self.students.update_profile(id, update).await?;
        tracing::info!(student_id = %id, complete = student.profile_complete, "Profile updated");
        Ok(student)
    }

    pub async fn accept_terms(
        &self,
        id: Uuid,
        ip_address: Option<IpNetwork>,
        user_agent: Option<String>,
    ) -> Result<TermsAcceptance> {
        self.get_student(id).await?;
        let acceptance = self
            .terms
            .record_acceptance(NewTermsAcceptance {
                student_id: id,
                terms_version: self.settings.terms_version.clone(),
                ip_address,
                user_agent,
            })
            .await?;
        tracing::info!(student_id = %id, version = %acceptance.terms_version, "Terms accepted");
        Ok(acceptance)
    }

    /// Every acceptance on record, oldest first.
    pub async fn terms_history(&self, id: Uuid) -> Result<Vec<TermsAcceptance>> {
        self.get_student(id).await?;
        self.terms.list_acceptances(id).await
    }

    pub async fn get_status(&self, id: Uuid) -> Result<StudentStatus> {
        self.statuses
            .get_status(id)
            .await?
            .ok_or_else(|| Error::NotFound("Student not found".to_string()))
    }

    pub async fn deactivate(&self, id: Uuid) -> Result<Student> {
        let student = self.students.set_active(id, false).await?;
        tracing::warn!(student_id = %id, "Student deactivated");
        Ok(student)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::services::notification_service::RecordingDispatcher;
    use crate::utils::time::ManualClock;
    use chrono::Utc;

    struct Harness {
        service: StudentService,
        notifier: RecordingDispatcher,
        clock: ManualClock,
    }

    fn harness() -> Harness {
        let store = MemoryStore::new();
        let notifier = RecordingDispatcher::new();
        let clock = ManualClock::new(Utc::now());
        let service = StudentService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store),
            Arc::new(notifier.clone()),
            Arc::new(clock.clone()),
            JwtKeys::new("test-secret", 1),
            AccountSettings {
                terms_version: "v2".into(),
                admin_emails: vec!["admin@example.com".into()],
                lockout: LockoutPolicy {
                    max_login_attempts: 3,
                    lockout: Duration::minutes(15),
                },
            },
        );
        Harness {
            service,
            notifier,
            clock,
        }
    }

    #[tokio::test]
    async fn register_then_login() {
        let h = harness();
        let student = h
            .service
            .register(" Priya@Example.com ", "correct horse", Some("Priya".into()))
            .await
            .unwrap();
        assert_eq!(student.email, "priya@example.com");
        assert!(matches!(
            h.notifier.events().as_slice(),
            [NotificationEvent::Welcome { .. }, NotificationEvent::EmailVerification { .. }]
        ));

        let login = h.service.login("priya@example.com", "correct horse").await.unwrap();
        assert_eq!(login.role, ROLE_STUDENT);
        assert!(!login.token.is_empty());

        let dup = h.service.register("priya@example.com", "x", None).await.unwrap_err();
        assert!(matches!(dup, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn repeated_failures_lock_the_account() {
        let h = harness();
        h.service.register("lock@example.com", "right-pass", None).await.unwrap();

        for _ in 0..3 {
            let err = h.service.login("lock@example.com", "wrong").await.unwrap_err();
            assert!(matches!(err, Error::Unauthorized(_)));
        }
        assert!(h
            .notifier
            .events()
            .iter()
            .any(|e| matches!(e, NotificationEvent::SecurityAlert { .. })));

        // Even the right password is refused while locked.
        assert!(h.service.login("lock@example.com", "right-pass").await.is_err());

        h.clock.advance(Duration::minutes(16));
        assert!(h.service.login("lock@example.com", "right-pass").await.is_ok());
    }

    #[tokio::test]
    async fn admin_emails_get_admin_role() {
        let h = harness();
        h.service.register("admin@example.com", "admin-pass", None).await.unwrap();
        let login = h.service.login("admin@example.com", "admin-pass").await.unwrap();
        assert_eq!(login.role, ROLE_ADMIN);
    }

    #[tokio::test]
    async fn password_reset_flow() {
        let h = harness();
        h.service.register("reset@example.com", "old-pass", None).await.unwrap();
        h.service.request_password_reset("reset@example.com").await.unwrap();
        h.service.request_password_reset("nobody@example.com").await.unwrap();

        let token = h
            .notifier
            .events()
            .into_iter()
            .find_map(|e| match e {
                NotificationEvent::PasswordReset { token, .. } => Some(token),
                _ => None,
            })
            .unwrap();

        h.service.reset_password(&token, "new-pass").await.unwrap();
        assert!(h.service.login("reset@example.com", "new-pass").await.is_ok());
        assert!(h.service.reset_password(&token, "again").await.is_err());
    }

    #[tokio::test]
    async fn expired_verification_token_is_rejected() {
        let h = harness();
        h.service.register("verify@example.com", "pass-word", None).await.unwrap();
        let token = h
            .notifier
            .events()
            .into_iter()
            .find_map(|e| match e {
                NotificationEvent::EmailVerification { token, .. } => Some(token),
                _ => None,
            })
            .unwrap();
        h.clock.advance(Duration::hours(25));
        let err = h.service.verify_email(&token).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn accepting_terms_records_current_version() {
        let h = harness();
        let student = h.service.register("terms@example.com", "pass-word", None).await.unwrap();
        let acceptance = h.service.accept_terms(student.id, None, Some("ua".into())).await.unwrap();
        assert_eq!(acceptance.terms_version, "v2");
        assert!(h.service.get_status(student.id).await.unwrap().terms_accepted);

        h.service.accept_terms(student.id, None, None).await.unwrap();
        let history = h.service.terms_history(student.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].user_agent.as_deref(), Some("ua"));

        let err = h.service.terms_history(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn deactivated_student_cannot_log_in() {
        let h = harness();
        let student = h.service.register("gone@example.com", "pass-word", None).await.unwrap();
        h.service.deactivate(student.id).await.unwrap();
        let err = h.service.login("gone@example.com", "pass-word").await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }
}
