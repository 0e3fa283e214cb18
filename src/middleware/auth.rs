use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::{Error, Result};

pub const ROLE_STUDENT: &str = "student";
pub const ROLE_ADMIN: &str = "admin";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
    pub role: String,
}

impl Claims {
    pub fn student_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|_| Error::Unauthorized("Malformed token subject".to_string()))
    }

    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case(ROLE_ADMIN)
    }
}

/// HS256 signing material shared by login and the auth middleware.
#[derive(Clone)]
pub struct JwtKeys {
    secret: String,
    ttl: Duration,
}

impl JwtKeys {
    pub fn new(secret: impl Into<String>, ttl_hours: i64) -> Self {
        Self {
            secret: secret.into(),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, student_id: Uuid, role: &str, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            sub: student_id.to_string(),
            exp: (now + self.ttl).timestamp().max(0) as usize,
            iat: now.timestamp().max(0) as usize,
            role: role.to_string(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| Error::Internal(format!("Failed to sign token: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|_| Error::Unauthorized("Invalid or expired token".to_string()))
    }
}

fn reject(status: StatusCode, code: &str) -> Response {
    (status, Json(json!({ "error": code }))).into_response()
}

fn bearer_claims(keys: &JwtKeys, req: &Request) -> std::result::Result<Claims, Response> {
    let Some(auth_header) = req.headers().get(axum::http::header::AUTHORIZATION) else {
        return Err(reject(StatusCode::UNAUTHORIZED, "missing_authorization"));
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return Err(reject(StatusCode::UNAUTHORIZED, "bad_authorization"));
    };
    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return Err(reject(StatusCode::UNAUTHORIZED, "unsupported_scheme"));
    };
    keys.verify(token)
        .map_err(|_| reject(StatusCode::UNAUTHORIZED, "invalid_token"))
}

/// Any authenticated caller; the claims are placed in request extensions.
pub async fn require_bearer_auth(State(keys): State<JwtKeys>, mut req: Request, next: Next) -> Response {
    match bearer_claims(&keys, &req) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(resp) => resp,
    }
}

pub async fn require_admin(State(keys): State<JwtKeys>, mut req: Request, next: Next) -> Response {
    match bearer_claims(&keys, &req) {
        Ok(claims) if claims.is_admin() => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Ok(_) => reject(StatusCode::FORBIDDEN, "forbidden"),
        Err(resp) => resp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let keys = JwtKeys::new("secret", 1);
        let id = Uuid::new_v4();
        let token = keys.issue(id, ROLE_STUDENT, Utc::now()).unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.student_id().unwrap(), id);
        assert!(!claims.is_admin());
    }

    #[test]
    fn expired_or_foreign_tokens_are_rejected() {
        let keys = JwtKeys::new("secret", 1);
        let stale = keys
            .issue(Uuid::new_v4(), ROLE_ADMIN, Utc::now() - Duration::hours(3))
            .unwrap();
        assert!(keys.verify(&stale).is_err());

        let other = JwtKeys::new("other-secret", 1);
        let token = other.issue(Uuid::new_v4(), ROLE_ADMIN, Utc::now()).unwrap();
        assert!(keys.verify(&token).is_err());
    }
}
