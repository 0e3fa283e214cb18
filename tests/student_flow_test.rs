use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;

use internship_backend::{
    config::{Config, StorageBackend},
    database::{memory::MemoryStore, repository::Repositories},
    error::Result,
    routes,
    services::{notification_service::RecordingDispatcher, payment_service::PaymentGateway},
    utils::{crypto::hmac_sha256_hex, time::ManualClock},
    AppState, Collaborators,
};

const KEY_SECRET: &str = "rzp_test_secret";

struct FakeGateway;

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(&self, _amount: i64, _currency: &str, receipt: &str) -> Result<String> {
        Ok(format!("order_{}", receipt))
    }
}

fn test_config() -> Config {
    Config {
        server_address: "127.0.0.1:0".into(),
        storage_backend: StorageBackend::Memory,
        database_url: None,
        db_max_connections: 1,
        jwt_secret: "test_secret_key".into(),
        jwt_ttl_hours: 1,
        email_service_url: "http://localhost:4000".into(),
        email_service_token: None,
        razorpay_key_id: "rzp_test_key".into(),
        razorpay_key_secret: KEY_SECRET.into(),
        test_fee: Decimal::new(50000, 2),
        test_fee_currency: "INR".into(),
        terms_version: "v1".into(),
        max_attempts: 1,
        warning_threshold: 3,
        attempt_duration_minutes: 30,
        penalty_factor: 0.0,
        passing_threshold: 60.0,
        sweep_interval_secs: 60,
        max_login_attempts: 5,
        lockout_minutes: 15,
        admin_emails: vec!["admin@example.com".into()],
    }
}

struct TestApp {
    router: Router,
    notifier: RecordingDispatcher,
    clock: ManualClock,
}

fn test_app() -> TestApp {
    let notifier = RecordingDispatcher::new();
    let clock = ManualClock::new(Utc::now());
    let state = AppState::new(
        &test_config(),
        Repositories::in_memory(MemoryStore::new()),
        Collaborators {
            notifier: Arc::new(notifier.clone()),
            gateway: Arc::new(FakeGateway),
            clock: Arc::new(clock.clone()),
        },
    );
    TestApp {
        router: routes::router(state),
        notifier,
        clock,
    }
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<JsonValue>,
) -> (StatusCode, JsonValue) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let body = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn register_and_login(app: &Router, email: &str) -> String {
    let (status, _) = call(
        app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "email": email, "password": "long-enough-pass", "name": "Test" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(
        app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": email, "password": "long-enough-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

async fn seed_questions(app: &Router) {
    let admin = register_and_login(app, "admin@example.com").await;
    let questions: Vec<JsonValue> = (1..=5)
        .map(|id| {
            json!({
                "id": id,
                "question": format!("Question {}", id),
                "options": ["a", "b", "c", "d"],
                "correct_option": 1
            })
        })
        .collect();
    let (status, body) = call(
        app,
        "PUT",
        "/api/admin/questions",
        Some(&admin),
        Some(JsonValue::Array(questions)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 5);
}

async fn make_eligible(app: &Router, token: &str) {
    let (status, _) = call(
        app,
        "POST",
        "/api/students/me/terms",
        Some(token),
        Some(json!({ "accepted": true })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(
        app,
        "PATCH",
        "/api/students/me",
        Some(token),
        Some(json!({
            "name": "Meera Iyer",
            "phone": "9876543210",
            "college": "Anna University",
            "roll_number": "21IT042",
            "branch": "IT",
            "year": 3
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["profile_complete"], true);

    let (status, order) = call(app, "POST", "/api/payments/orders", Some(token), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["amount"], 50000);
    let order_id = order["order_id"].as_str().unwrap().to_string();
    let signature = hmac_sha256_hex(KEY_SECRET, &format!("{}|pay_123", order_id)).unwrap();

    let (status, payment) = call(
        app,
        "POST",
        "/api/payments/verify",
        Some(token),
        Some(json!({
            "razorpay_order_id": order_id,
            "razorpay_payment_id": "pay_123",
            "razorpay_signature": signature,
            "method": "upi"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payment["status"], "completed");
}

#[tokio::test]
async fn student_takes_test_end_to_end() {
    let app = test_app();
    seed_questions(&app.router).await;
    let token = register_and_login(&app.router, "meera@example.com").await;

    let (status, body) = call(&app.router, "GET", "/api/students/me/eligibility", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], false);
    assert_eq!(body["reason"], "TERMS_NOT_ACCEPTED");

    make_eligible(&app.router, &token).await;

    let (_, status_body) = call(&app.router, "GET", "/api/students/me/status", Some(&token), None).await;
    assert_eq!(status_body["can_access_tests"], true);

    let (status, started) = call(&app.router, "POST", "/api/attempts", Some(&token), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(started["attempt_number"], 1);
    let questions = started["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 5);
    assert!(questions[0].get("correct_option").is_none());
    let attempt_id = started["attempt_id"].as_str().unwrap().to_string();

    let (status, body) = call(&app.router, "POST", "/api/attempts", Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "ATTEMPT_IN_PROGRESS");

    app.clock.advance(chrono::Duration::minutes(12));
    let answers: Vec<JsonValue> = (1..=4)
        .map(|id| json!({ "question_id": id, "selected": 1 }))
        .collect();
    let (status, body) = call(
        &app.router,
        "POST",
        &format!("/api/attempts/{}/submit", attempt_id),
        Some(&token),
        Some(json!({ "answers": answers })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["correct_answers"], 4);
    assert_eq!(body["unanswered_questions"], 1);
    assert_eq!(body["passed"], true);
    assert_eq!(body["duration_seconds"], 720);
    assert_eq!(body["time_remaining_seconds"], 0);

    let (status, body) = call(
        &app.router,
        "POST",
        &format!("/api/attempts/{}/submit", attempt_id),
        Some(&token),
        Some(json!({ "answers": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "INVALID_STATE");

    let (status, body) = call(&app.router, "POST", "/api/attempts", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "ATTEMPT_LIMIT_REACHED");

    let kinds: Vec<&'static str> = app.notifier.events().iter().map(|e| e.kind()).collect();
    assert!(kinds.contains(&"payment_confirmed"));
    assert!(kinds.contains(&"test_completed"));
}

#[tokio::test]
async fn unpaid_student_cannot_start() {
    let app = test_app();
    seed_questions(&app.router).await;
    let token = register_and_login(&app.router, "unpaid@example.com").await;

    let (status, _) = call(
        &app.router,
        "POST",
        "/api/students/me/terms",
        Some(&token),
        Some(json!({ "accepted": true })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(&app.router, "POST", "/api/attempts", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "PAYMENT_NOT_COMPLETED");
}

#[tokio::test]
async fn sweep_abandons_overdue_attempts() {
    let app = test_app();
    seed_questions(&app.router).await;
    let token = register_and_login(&app.router, "slow@example.com").await;
    make_eligible(&app.router, &token).await;

    let (_, started) = call(&app.router, "POST", "/api/attempts", Some(&token), None).await;
    let attempt_id = started["attempt_id"].as_str().unwrap().to_string();

    app.clock.advance(chrono::Duration::minutes(31));
    let (_, admin_login) = call(
        &app.router,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": "admin@example.com", "password": "long-enough-pass" })),
    )
    .await;
    let admin = admin_login["token"].as_str().unwrap().to_string();

    let (status, body) = call(&app.router, "POST", "/api/admin/sweep", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expired"], 1);

    let (_, attempt) = call(
        &app.router,
        "GET",
        &format!("/api/attempts/{}", attempt_id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(attempt["status"], "abandoned");
    assert_eq!(attempt["duration_seconds"], 1800);
}

#[tokio::test]
async fn auth_is_enforced() {
    let app = test_app();
    let (status, _) = call(&app.router, "GET", "/api/students/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app.router, "GET", "/api/students/me", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = register_and_login(&app.router, "plain@example.com").await;
    let (status, _) = call(&app.router, "POST", "/api/admin/sweep", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &app.router,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "email": "not-an-email", "password": "long-enough-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let (status, body) = call(&app.router, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn tampered_payment_signature_is_rejected() {
    let app = test_app();
    let token = register_and_login(&app.router, "tamper@example.com").await;
    let (_, order) = call(&app.router, "POST", "/api/payments/orders", Some(&token), None).await;
    let order_id = order["order_id"].as_str().unwrap().to_string();
    let forged = hmac_sha256_hex("wrong-secret", &format!("{}|pay_9", order_id)).unwrap();

    let (status, body) = call(
        &app.router,
        "POST",
        "/api/payments/verify",
        Some(&token),
        Some(json!({
            "razorpay_order_id": order_id,
            "razorpay_payment_id": "pay_9",
            "razorpay_signature": forged
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let (_, payments) = call(&app.router, "GET", "/api/payments", Some(&token), None).await;
    assert_eq!(payments[0]["status"], "failed");
}
