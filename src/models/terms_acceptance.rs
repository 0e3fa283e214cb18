use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::FromRow;
use uuid::Uuid;

/// One acceptance event. Rows are never updated.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TermsAcceptance {
    pub id: Uuid,
    pub student_id: Uuid,
    pub terms_version: String,
    pub accepted_at: DateTime<Utc>,
    pub ip_address: Option<IpNetwork>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewTermsAcceptance {
    pub student_id: Uuid,
    pub terms_version: String,
    pub ip_address: Option<IpNetwork>,
    pub user_agent: Option<String>,
}
