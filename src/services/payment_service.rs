use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::repository::{PaymentRepository, StudentRepository};
use crate::error::{Error, Result};
use crate::models::payment::{NewPayment, Payment, PaymentStatus, PaymentUpdate};
use crate::services::notification_service::{NotificationDispatcher, NotificationEvent};
use crate::utils::crypto::verify_razorpay_signature;
use crate::utils::token::generate_order_receipt;

/// What the attempt core is allowed to know about payments.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    async fn is_payment_completed(&self, student_id: Uuid) -> Result<bool>;

    async fn amount_paid(&self, student_id: Uuid) -> Result<Decimal>;
}

/// Creates orders with the payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, amount_minor: i64, currency: &str, receipt: &str) -> Result<String>;
}

const RAZORPAY_API: &str = "https://api.razorpay.com/v1";

#[derive(Clone)]
pub struct RazorpayGateway {
    client: Client,
    key_id: String,
    key_secret: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct RazorpayOrder {
    id: String,
}

impl RazorpayGateway {
    pub fn new(client: Client, key_id: String, key_secret: String) -> Self {
        Self {
            client,
            key_id,
            key_secret,
            base_url: RAZORPAY_API.to_string(),
        }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(&self, amount_minor: i64, currency: &str, receipt: &str) -> Result<String> {
        let resp = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&json!({
                "amount": amount_minor,
                "currency": currency,
                "receipt": receipt,
            }))
            .send()
            .await
            .map_err(|e| Error::DownstreamUnavailable(format!("Razorpay unreachable: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, "Razorpay order creation failed");
            return Err(Error::DownstreamUnavailable(format!(
                "Razorpay returned {}",
                status
            )));
        }
        let order: RazorpayOrder = resp.json().await?;
        Ok(order.id)
    }
}

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub key_secret: String,
    pub fee: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct PaymentVerification {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
    pub method: Option<String>,
}

#[derive(Clone)]
pub struct PaymentService {
    payments: Arc<dyn PaymentRepository>,
    students: Arc<dyn StudentRepository>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn NotificationDispatcher>,
    settings: PaymentSettings,
}

impl PaymentService {
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        students: Arc<dyn StudentRepository>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationDispatcher>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            payments,
            students,
            gateway,
            notifier,
            settings,
        }
    }

    pub async fn create_order(&self, student_id: Uuid) -> Result<Payment> {
        let student = self
            .students
            .find_student(student_id)
            .await?
            .ok_or_else(|| Error::NotFound("Student not found".to_string()))?;
        if !student.active {
            return Err(Error::Forbidden("Account is inactive".to_string()));
        }
        if self.is_payment_completed(student_id).await? {
            return Err(Error::Conflict("Test fee has already been paid".to_string()));
        }

        let amount_minor = (self.settings.fee * Decimal::from(100))
            .round()
            .to_i64()
            .ok_or_else(|| Error::Config("Test fee is out of range".to_string()))?;
        let receipt = generate_order_receipt();
        let order_id = self
            .gateway
            .create_order(amount_minor, &self.settings.currency, &receipt)
            .await?;

        let payment = self
            .payments
            .create_payment(NewPayment {
                student_id,
                external_order_id: order_id,
                amount: self.settings.fee,
                currency: self.settings.currency.clone(),
            })
            .await?;
        tracing::info!(student_id = %student_id, order_id = %payment.external_order_id, "Payment order created");
        Ok(payment)
    }

    /// Checks the checkout signature and settles the order. A bad signature
    /// fails the order and is reported as a validation error.
    pub async fn verify_payment(&self, student_id: Uuid, req: PaymentVerification) -> Result<Payment> {
        let payment = self
            .payments
            .find_by_order_id(&req.order_id)
            .await?
            .filter(|p| p.student_id == student_id)
            .ok_or_else(|| Error::NotFound("Payment order not found".to_string()))?;

        if payment.status == PaymentStatus::Completed
            && payment.external_payment_id.as_deref() == Some(req.payment_id.as_str())
        {
            return Ok(payment);
        }
        if payment.status != PaymentStatus::Pending {
            return Err(Error::InvalidState(format!(
                "Payment is already {}",
                payment.status
            )));
        }

        let valid = verify_razorpay_signature(
            &self.settings.key_secret,
            &req.order_id,
            &req.payment_id,
            &req.signature,
        );

        if !valid {
            tracing::warn!(student_id = %student_id, order_id = %req.order_id, "Payment signature mismatch");
            self.payments
                .transition(
                    &req.order_id,
                    PaymentStatus::Pending,
                    PaymentStatus::Failed,
                    PaymentUpdate {
                        external_payment_id: Some(req.payment_id),
                        method: req.method,
                        ..Default::default()
                    },
                )
                .await?;
            return Err(Error::Validation("Invalid payment signature".to_string()));
        }

        let completed = self
            .payments
            .transition(
                &req.order_id,
                PaymentStatus::Pending,
                PaymentStatus::Completed,
                PaymentUpdate {
                    external_payment_id: Some(req.payment_id),
                    method: req.method,
                    ..Default::default()
                },
            )
            .await?
            .ok_or_else(|| Error::Conflict("Payment was settled concurrently".to_string()))?;

        tracing::info!(student_id = %student_id, order_id = %completed.external_order_id, "Payment completed");
        if let Some(student) = self.students.find_student(student_id).await? {
            self.notifier.dispatch(NotificationEvent::PaymentConfirmed {
                email: student.email,
                order_id: completed.external_order_id.clone(),
                amount: completed.amount,
                currency: completed.currency.clone(),
            });
        }
        Ok(completed)
    }

    pub async fn refund(
        &self,
        order_id: &str,
        refund_id: String,
        amount: Option<Decimal>,
    ) -> Result<Payment> {
        let payment = self
            .payments
            .find_by_order_id(order_id)
            .await?
            .ok_or_else(|| Error::NotFound("Payment order not found".to_string()))?;
        if !payment.status.can_transition_to(PaymentStatus::Refunded) {
            return Err(Error::InvalidState(format!(
                "Cannot refund a {} payment",
                payment.status
            )));
        }
        let refund_amount = amount.unwrap_or(payment.amount);
        if refund_amount <= Decimal::ZERO || refund_amount > payment.amount {
            return Err(Error::Validation(format!(
                "Refund amount must be greater than 0 and at most {}",
                payment.amount
            )));
        }
        let refunded = self
            .payments
            .transition(
                order_id,
                PaymentStatus::Completed,
                PaymentStatus::Refunded,
                PaymentUpdate {
                    refund_id: Some(refund_id),
                    refund_amount: Some(refund_amount),
                    refunded_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?
            .ok_or_else(|| Error::Conflict("Payment changed concurrently".to_string()))?;
        tracing::info!(order_id = %order_id, "Payment refunded");
        Ok(refunded)
    }

    pub async fn list_payments(&self, student_id: Uuid) -> Result<Vec<Payment>> {
        self.payments.list_payments(student_id).await
    }
}

#[async_trait]
impl PaymentLedger for PaymentService {
    async fn is_payment_completed(&self, student_id: Uuid) -> Result<bool> {
        let payments = self.payments.list_payments(student_id).await?;
        Ok(payments.iter().any(|p| p.status == PaymentStatus::Completed))
    }

    async fn amount_paid(&self, student_id: Uuid) -> Result<Decimal> {
        let payments = self.payments.list_payments(student_id).await?;
        Ok(payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Completed)
            .map(|p| p.amount)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::database::repository::StatusRepository;
    use crate::models::student::NewStudent;
    use crate::services::notification_service::RecordingDispatcher;
    use crate::utils::crypto::hmac_sha256_hex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGateway(AtomicUsize);

    #[async_trait]
    impl PaymentGateway for CountingGateway {
        async fn create_order(&self, _amount: i64, _currency: &str, _receipt: &str) -> Result<String> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            Ok(format!("order_test_{}", n))
        }
    }

    async fn setup() -> (PaymentService, MemoryStore, RecordingDispatcher, Uuid) {
        let store = MemoryStore::new();
        let student = store
            .create_student(NewStudent {
                email: "pay@example.com".into(),
                password_hash: "x".into(),
                name: None,
                verification_token: "v".into(),
                verification_token_expires: Utc::now(),
            })
            .await
            .unwrap();
        let notifier = RecordingDispatcher::new();
        let svc = PaymentService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(CountingGateway(AtomicUsize::new(0))),
            Arc::new(notifier.clone()),
            PaymentSettings {
                key_secret: "rzp_secret".into(),
                fee: Decimal::new(50000, 2),
                currency: "INR".into(),
            },
        );
        (svc, store, notifier, student.id)
    }

    #[tokio::test]
    async fn valid_signature_completes_payment() {
        let (svc, store, notifier, student_id) = setup().await;
        let order = svc.create_order(student_id).await.unwrap();
        assert_eq!(order.status, PaymentStatus::Pending);

        let sig = hmac_sha256_hex("rzp_secret", &format!("{}|pay_1", order.external_order_id)).unwrap();
        let paid = svc
            .verify_payment(
                student_id,
                PaymentVerification {
                    order_id: order.external_order_id.clone(),
                    payment_id: "pay_1".into(),
                    signature: sig,
                    method: Some("upi".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(paid.status, PaymentStatus::Completed);
        assert!(svc.is_payment_completed(student_id).await.unwrap());
        assert_eq!(svc.amount_paid(student_id).await.unwrap(), Decimal::new(50000, 2));
        assert!(store.get_status(student_id).await.unwrap().unwrap().payment_completed);
        assert!(matches!(
            notifier.events().last(),
            Some(NotificationEvent::PaymentConfirmed { .. })
        ));

        let again = svc.create_order(student_id).await.unwrap_err();
        assert!(matches!(again, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn bad_signature_fails_the_order() {
        let (svc, _store, _notifier, student_id) = setup().await;
        let order = svc.create_order(student_id).await.unwrap();
        let err = svc
            .verify_payment(
                student_id,
                PaymentVerification {
                    order_id: order.external_order_id.clone(),
                    payment_id: "pay_1".into(),
                    signature: "deadbeef".into(),
                    method: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let payments = svc.list_payments(student_id).await.unwrap();
        assert_eq!(payments[0].status, PaymentStatus::Failed);
        assert!(!svc.is_payment_completed(student_id).await.unwrap());
    }

    #[tokio::test]
    async fn refund_requires_completed_payment() {
        let (svc, _store, _notifier, student_id) = setup().await;
        let order = svc.create_order(student_id).await.unwrap();
        let err = svc
            .refund(&order.external_order_id, "rfnd_1".into(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn refund_amount_is_bounded_by_the_payment() {
        let (svc, _store, _notifier, student_id) = setup().await;
        let order = svc.create_order(student_id).await.unwrap();
        let sig = hmac_sha256_hex("rzp_secret", &format!("{}|pay_9", order.external_order_id)).unwrap();
        svc.verify_payment(
            student_id,
            PaymentVerification {
                order_id: order.external_order_id.clone(),
                payment_id: "pay_9".into(),
                signature: sig,
                method: None,
            },
        )
        .await
        .unwrap();

        for bad in [Decimal::ZERO, Decimal::new(-100, 2), Decimal::new(50001, 2)] {
            let err = svc
                .refund(&order.external_order_id, "rfnd_bad".into(), Some(bad))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{} accepted", bad);
        }
        assert!(svc.is_payment_completed(student_id).await.unwrap());

        let refunded = svc
            .refund(&order.external_order_id, "rfnd_2".into(), Some(Decimal::new(20000, 2)))
            .await
            .unwrap();
        assert_eq!(refunded.status, PaymentStatus::Refunded);
        assert_eq!(refunded.refund_amount, Some(Decimal::new(20000, 2)));
    }
}
