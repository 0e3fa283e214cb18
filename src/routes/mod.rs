pub mod admin;
pub mod attempts;
pub mod auth;
pub mod health;
pub mod payments;
pub mod students;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::middleware::auth::{require_admin, require_bearer_auth};
use crate::AppState;

/// Every HTTP route, with auth layers applied. Transport layers (CORS,
/// tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    let base_routes = Router::new().route("/health", get(health::health));

    let auth_api = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/verify-email", post(auth::verify_email))
        .route("/api/auth/forgot-password", post(auth::forgot_password))
        .route("/api/auth/reset-password", post(auth::reset_password));

    let student_api = Router::new()
        .route(
            "/api/students/me",
            get(students::get_me).patch(students::update_me),
        )
        .route(
            "/api/students/me/terms",
            get(students::list_terms).post(students::accept_terms),
        )
        .route("/api/students/me/status", get(students::get_status))
        .route("/api/students/me/eligibility", get(students::get_eligibility))
        .route("/api/payments", get(payments::list_payments))
        .route("/api/payments/orders", post(payments::create_order))
        .route("/api/payments/verify", post(payments::verify_payment))
        .route(
            "/api/attempts",
            get(attempts::list_attempts).post(attempts::start_attempt),
        )
        .route("/api/attempts/:id", get(attempts::get_attempt))
        .route("/api/attempts/:id/questions", get(attempts::get_questions))
        .route("/api/attempts/:id/warnings", post(attempts::record_warning))
        .route("/api/attempts/:id/submit", post(attempts::submit_answers))
        .layer(axum::middleware::from_fn_with_state(
            state.jwt.clone(),
            require_bearer_auth,
        ));

    let admin_api = Router::new()
        .route("/api/admin/questions", put(admin::upsert_questions))
        .route("/api/admin/attempts/:id/regrade", post(admin::regrade_attempt))
        .route("/api/admin/sweep", post(admin::sweep))
        .route(
            "/api/admin/students/:id/deactivate",
            post(admin::deactivate_student),
        )
        .route(
            "/api/admin/payments/:order_id/refund",
            post(admin::refund_payment),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.jwt.clone(),
            require_admin,
        ));

    base_routes
        .merge(auth_api)
        .merge(student_api)
        .merge(admin_api)
        .with_state(state)
}
