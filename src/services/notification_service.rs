use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Transactional emails the platform asks the email service to send.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum NotificationEvent {
    Welcome {
        email: String,
        name: Option<String>,
    },
    EmailVerification {
        email: String,
        token: String,
    },
    PasswordReset {
        email: String,
        token: String,
    },
    PaymentConfirmed {
        email: String,
        order_id: String,
        amount: Decimal,
        currency: String,
    },
    TestCompleted {
        email: String,
        attempt_id: Uuid,
        attempt_number: i32,
        percentage_score: Decimal,
        passed: bool,
    },
    AttemptDisqualified {
        email: String,
        attempt_id: Uuid,
        warnings_count: i32,
    },
    SecurityAlert {
        email: String,
        reason: String,
    },
}

impl NotificationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::Welcome { .. } => "welcome",
            NotificationEvent::EmailVerification { .. } => "email_verification",
            NotificationEvent::PasswordReset { .. } => "password_reset",
            NotificationEvent::PaymentConfirmed { .. } => "payment_confirmed",
            NotificationEvent::TestCompleted { .. } => "test_completed",
            NotificationEvent::AttemptDisqualified { .. } => "attempt_disqualified",
            NotificationEvent::SecurityAlert { .. } => "security_alert",
        }
    }
}

/// Fire-and-forget delivery. Implementations must never block or fail the
/// operation that produced the event.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, event: NotificationEvent);
}

/// Hands events to the external email microservice over HTTP.
#[derive(Clone)]
pub struct EmailNotificationService {
    client: Client,
    endpoint: Url,
    auth_token: Option<String>,
}

impl EmailNotificationService {
    pub fn new(client: Client, base_url: &str, auth_token: Option<String>) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid EMAIL_SERVICE_URL: {}", e)))?;
        let endpoint = base
            .join("/api/email/send")
            .map_err(|e| Error::Config(format!("Invalid EMAIL_SERVICE_URL: {}", e)))?;
        Ok(Self {
            client,
            endpoint,
            auth_token,
        })
    }

    pub async fn deliver(&self, event: &NotificationEvent) -> Result<()> {
        let mut req = self.client.post(self.endpoint.clone()).json(event);
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::DownstreamUnavailable(format!(
                "email service returned {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}

impl NotificationDispatcher for EmailNotificationService {
    fn dispatch(&self, event: NotificationEvent) {
        let svc = self.clone();
        tokio::spawn(async move {
            match svc.deliver(&event).await {
                Ok(()) => tracing::info!(kind = event.kind(), "Notification delivered"),
                Err(e) => {
                    tracing::error!(kind = event.kind(), error = %e, "Notification delivery failed")
                }
            }
        });
    }
}

/// Keeps dispatched events in memory; used by tests and local runs.
#[derive(Clone, Default)]
pub struct RecordingDispatcher {
    events: Arc<Mutex<Vec<NotificationEvent>>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }
}

impl NotificationDispatcher for RecordingDispatcher {
    fn dispatch(&self, event: NotificationEvent) {
        tracing::debug!(kind = event.kind(), "Notification recorded");
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
