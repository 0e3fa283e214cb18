use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::payment::Payment;

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub key_id: String,
    /// Amount in the currency's minor unit, as the checkout widget expects.
    pub amount: i64,
    pub currency: String,
    pub payment: Payment,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1))]
    pub razorpay_order_id: String,
    #[validate(length(min = 1))]
    pub razorpay_payment_id: String,
    #[validate(length(equal = 64))]
    pub razorpay_signature: String,
    pub method: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RefundRequest {
    #[validate(length(min = 1))]
    pub refund_id: String,
    pub amount: Option<Decimal>,
}
