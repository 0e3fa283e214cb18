use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use validator::Validate;

use crate::dto::payment_dto::{CreateOrderResponse, VerifyPaymentRequest};
use crate::error::Error;
use crate::middleware::auth::Claims;
use crate::models::payment::Payment;
use crate::services::payment_service::PaymentVerification;
use crate::AppState;

#[axum::debug_handler]
pub async fn create_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> crate::error::Result<Response> {
    let payment = state
        .payment_service
        .create_order(claims.student_id()?)
        .await?;
    let amount = (payment.amount * Decimal::from(100))
        .to_i64()
        .ok_or_else(|| Error::Internal("Payment amount out of range".to_string()))?;
    let response = CreateOrderResponse {
        order_id: payment.external_order_id.clone(),
        key_id: state.razorpay_key_id.clone(),
        amount,
        currency: payment.currency.clone(),
        payment,
    };
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

#[axum::debug_handler]
pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<VerifyPaymentRequest>,
) -> crate::error::Result<Json<Payment>> {
    req.validate()?;
    let payment = state
        .payment_service
        .verify_payment(
            claims.student_id()?,
            PaymentVerification {
                order_id: req.razorpay_order_id,
                payment_id: req.razorpay_payment_id,
                signature: req.razorpay_signature,
                method: req.method,
            },
        )
        .await?;
    Ok(Json(payment))
}

#[axum::debug_handler]
pub async fn list_payments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> crate::error::Result<Json<Vec<Payment>>> {
    let payments = state
        .payment_service
        .list_payments(claims.student_id()?)
        .await?;
    Ok(Json(payments))
}
