use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::attempt_dto::{
    AttemptQuestionsResponse, AttemptResponse, StartAttemptResponse, SubmitAnswersRequest,
    WarningRequest,
};
use crate::middleware::auth::Claims;
use crate::models::question::PublicQuestion;
use crate::models::test_attempt::TestAttempt;
use crate::AppState;

fn with_remaining(state: &AppState, attempt: TestAttempt) -> AttemptResponse {
    AttemptResponse {
        time_remaining_seconds: state.attempt_service.time_remaining(&attempt),
        attempt,
    }
}

#[axum::debug_handler]
pub async fn start_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> crate::error::Result<Response> {
    let attempt = state
        .attempt_service
        .start_attempt(claims.student_id()?)
        .await?;
    let response = StartAttemptResponse {
        attempt_id: attempt.id,
        attempt_number: attempt.attempt_number,
        start_time: attempt.start_time,
        expires_at: attempt.start_time + state.attempt_service.policy().duration,
        questions: attempt.questions_snapshot.iter().map(PublicQuestion::from).collect(),
    };
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

#[axum::debug_handler]
pub async fn list_attempts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> crate::error::Result<Json<Vec<AttemptResponse>>> {
    let attempts = state
        .attempt_service
        .list_attempts(claims.student_id()?)
        .await?;
    Ok(Json(
        attempts
            .into_iter()
            .map(|a| with_remaining(&state, a))
            .collect(),
    ))
}

#[axum::debug_handler]
pub async fn get_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> crate::error::Result<Json<AttemptResponse>> {
    let attempt = state
        .attempt_service
        .get_owned_attempt(claims.student_id()?, id)
        .await?;
    Ok(Json(with_remaining(&state, attempt)))
}

#[axum::debug_handler]
pub async fn get_questions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> crate::error::Result<Json<AttemptQuestionsResponse>> {
    let student_id = claims.student_id()?;
    let attempt = state.attempt_service.get_owned_attempt(student_id, id).await?;
    let questions = state
        .attempt_service
        .questions_for_attempt(student_id, id)
        .await?;
    Ok(Json(AttemptQuestionsResponse {
        attempt_id: id,
        time_remaining_seconds: state.attempt_service.time_remaining(&attempt),
        questions: questions.iter().map(PublicQuestion::from).collect(),
    }))
}

#[axum::debug_handler]
pub async fn record_warning(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    body: Option<Json<WarningRequest>>,
) -> crate::error::Result<Json<AttemptResponse>> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    req.validate()?;
    tracing::info!(attempt_id = %id, kind = req.kind.as_deref().unwrap_or("unspecified"), "Proctoring warning reported");
    let attempt = state
        .attempt_service
        .record_warning(claims.student_id()?, id)
        .await?;
    Ok(Json(with_remaining(&state, attempt)))
}

#[axum::debug_handler]
pub async fn submit_answers(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitAnswersRequest>,
) -> crate::error::Result<Json<AttemptResponse>> {
    req.validate()?;
    let attempt = state
        .attempt_service
        .submit_answers(claims.student_id()?, id, req.answers)
        .await?;
    Ok(Json(with_remaining(&state, attempt)))
}
