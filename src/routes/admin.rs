use axum::{
    extract::{Path, State},
    response::Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::admin_dto::{SweepResponse, UpsertQuestionRequest};
use crate::dto::attempt_dto::AttemptResponse;
use crate::dto::payment_dto::RefundRequest;
use crate::models::payment::Payment;
use crate::models::question::Question;
use crate::models::student::Student;
use crate::AppState;

#[axum::debug_handler]
pub async fn upsert_questions(
    State(state): State<AppState>,
    Json(req): Json<Vec<UpsertQuestionRequest>>,
) -> crate::error::Result<Json<Vec<Question>>> {
    for q in &req {
        q.validate()?;
    }
    let questions: Vec<Question> = req.into_iter().map(Question::from).collect();
    let saved = state.repos.questions.upsert_questions(questions).await?;
    tracing::info!(count = saved.len(), "Question bank updated");
    Ok(Json(saved))
}

#[axum::debug_handler]
pub async fn regrade_attempt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> crate::error::Result<Json<AttemptResponse>> {
    let attempt = state.attempt_service.regrade_attempt(id).await?;
    Ok(Json(AttemptResponse {
        time_remaining_seconds: 0,
        attempt,
    }))
}

#[axum::debug_handler]
pub async fn sweep(State(state): State<AppState>) -> crate::error::Result<Json<SweepResponse>> {
    let expired = state.attempt_service.sweep_overdue().await?;
    Ok(Json(SweepResponse { expired }))
}

#[axum::debug_handler]
pub async fn deactivate_student(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> crate::error::Result<Json<Student>> {
    let student = state.student_service.deactivate(id).await?;
    Ok(Json(student))
}

#[axum::debug_handler]
pub async fn refund_payment(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Json(req): Json<RefundRequest>,
) -> crate::error::Result<Json<Payment>> {
    req.validate()?;
    let payment = state
        .payment_service
        .refund(&order_id, req.refund_id, req.amount)
        .await?;
    Ok(Json(payment))
}
