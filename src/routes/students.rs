use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde_json::json;
use sqlx::types::ipnetwork::IpNetwork;
use std::net::IpAddr;
use validator::Validate;

use crate::dto::student_dto::{AcceptTermsRequest, UpdateProfileRequest};
use crate::error::Error;
use crate::middleware::auth::Claims;
use crate::models::student::Student;
use crate::models::student_status::StudentStatus;
use crate::models::terms_acceptance::TermsAcceptance;
use crate::services::eligibility_service::reason_message;
use crate::AppState;

#[axum::debug_handler]
pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> crate::error::Result<Json<Student>> {
    let student = state.student_service.get_student(claims.student_id()?).await?;
    Ok(Json(student))
}

#[axum::debug_handler]
pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> crate::error::Result<Json<Student>> {
    req.validate()?;
    let student = state
        .student_service
        .update_profile(claims.student_id()?, req.into())
        .await?;
    Ok(Json(student))
}

/// First hop of `X-Forwarded-For`, falling back to `X-Real-IP`.
fn client_ip(headers: &HeaderMap) -> Option<IpNetwork> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next());
    let real = headers.get("x-real-ip").and_then(|v| v.to_str().ok());
    forwarded
        .or(real)
        .and_then(|raw| raw.trim().parse::<IpAddr>().ok())
        .map(IpNetwork::from)
}

#[axum::debug_handler]
pub async fn accept_terms(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    Json(req): Json<AcceptTermsRequest>,
) -> crate::error::Result<Response> {
    if !req.accepted {
        return Err(Error::Validation(
            "Terms must be explicitly accepted".to_string(),
        ));
    }
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let acceptance = state
        .student_service
        .accept_terms(claims.student_id()?, client_ip(&headers), user_agent)
        .await?;
    Ok((StatusCode::CREATED, Json(acceptance)).into_response())
}

#[axum::debug_handler]
pub async fn list_terms(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> crate::error::Result<Json<Vec<TermsAcceptance>>> {
    let history = state.student_service.terms_history(claims.student_id()?).await?;
    Ok(Json(history))
}

#[axum::debug_handler]
pub async fn get_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> crate::error::Result<Json<StudentStatus>> {
    let status = state.student_service.get_status(claims.student_id()?).await?;
    Ok(Json(status))
}

#[axum::debug_handler]
pub async fn get_eligibility(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> crate::error::Result<Response> {
    let decision = state
        .eligibility_service
        .can_start_attempt(claims.student_id()?)
        .await?;
    Ok(Json(json!({
        "allowed": decision.allowed,
        "reason": decision.reason,
        "message": decision.reason.map(reason_message),
    }))
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_ip_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "10.0.0.9".parse().unwrap());
        assert_eq!(
            client_ip(&headers).map(|ip| ip.ip().to_string()),
            Some("203.0.113.7".to_string())
        );

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "not-an-ip".parse().unwrap());
        assert_eq!(client_ip(&headers), None);
    }
}
