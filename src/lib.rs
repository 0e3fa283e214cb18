pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::config::Config;
use crate::database::repository::Repositories;
use crate::middleware::auth::JwtKeys;
use crate::services::{
    attempt_service::AttemptService,
    eligibility_service::EligibilityService,
    notification_service::NotificationDispatcher,
    payment_service::{PaymentGateway, PaymentService},
    student_service::StudentService,
};
use crate::utils::time::Clock;

/// Outbound integrations, swapped for fakes in tests.
#[derive(Clone)]
pub struct Collaborators {
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub jwt: JwtKeys,
    pub razorpay_key_id: String,
    pub student_service: StudentService,
    pub payment_service: PaymentService,
    pub eligibility_service: EligibilityService,
    pub attempt_service: AttemptService,
}

impl AppState {
    pub fn new(config: &Config, repos: Repositories, collaborators: Collaborators) -> Self {
        let Collaborators {
            notifier,
            gateway,
            clock,
        } = collaborators;
        let jwt = JwtKeys::new(config.jwt_secret.clone(), config.jwt_ttl_hours);

        let student_service = StudentService::new(
            repos.students.clone(),
            repos.terms.clone(),
            repos.statuses.clone(),
            notifier.clone(),
            clock.clone(),
            jwt.clone(),
            config.account_settings(),
        );
        let payment_service = PaymentService::new(
            repos.payments.clone(),
            repos.students.clone(),
            gateway,
            notifier.clone(),
            config.payment_settings(),
        );
        let eligibility_service = EligibilityService::new(
            repos.attempts.clone(),
            Arc::new(payment_service.clone()),
            config.max_attempts,
        );
        let attempt_service = AttemptService::new(
            repos.clone(),
            eligibility_service.clone(),
            notifier,
            clock,
            config.attempt_policy(),
            config.scoring_policy(),
        );

        Self {
            repos,
            jwt,
            razorpay_key_id: config.razorpay_key_id.clone(),
            student_service,
            payment_service,
            eligibility_service,
            attempt_service,
        }
    }
}
