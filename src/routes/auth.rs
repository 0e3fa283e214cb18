use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use validator::Validate;

use crate::dto::auth_dto::{
    ForgotPasswordRequest, LoginRequest, LoginResponse, RegisterRequest, ResetPasswordRequest,
    VerifyEmailRequest,
};
use crate::AppState;

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    let student = state
        .student_service
        .register(&req.email, &req.password, req.name)
        .await?;
    Ok((StatusCode::CREATED, Json(student)).into_response())
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> crate::error::Result<Json<LoginResponse>> {
    req.validate()?;
    let result = state.student_service.login(&req.email, &req.password).await?;
    Ok(Json(LoginResponse {
        token: result.token,
        token_type: "Bearer",
        expires_in: state.jwt.ttl().num_seconds(),
        role: result.role,
        student_id: result.student.id,
    }))
}

#[axum::debug_handler]
pub async fn verify_email(
    State(state): State<AppState>,
    Json(req): Json<VerifyEmailRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    state.student_service.verify_email(&req.token).await?;
    Ok(Json(json!({ "verified": true })).into_response())
}

#[axum::debug_handler]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    state.student_service.request_password_reset(&req.email).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "If the email is registered, a reset link has been sent"
        })),
    )
        .into_response())
}

#[axum::debug_handler]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> crate::error::Result<Response> {
    req.validate()?;
    state
        .student_service
        .reset_password(&req.token, &req.new_password)
        .await?;
    Ok(Json(json!({ "reset": true })).into_response())
}
