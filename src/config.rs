use crate::error::{Error, Result};
use dotenvy::dotenv;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" | "document" => Ok(StorageBackend::Memory),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub email_service_url: String,
    pub email_service_token: Option<String>,
    pub razorpay_key_id: String,
    pub razorpay_key_secret: String,
    pub test_fee: Decimal,
    pub test_fee_currency: String,
    pub terms_version: String,
    pub max_attempts: i64,
    pub warning_threshold: i32,
    pub attempt_duration_minutes: i64,
    pub penalty_factor: f64,
    pub passing_threshold: f64,
    pub sweep_interval_secs: u64,
    pub max_login_attempts: i32,
    pub lockout_minutes: i64,
    pub admin_emails: Vec<String>,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let storage_backend: StorageBackend = get_env_or("STORAGE_BACKEND", StorageBackend::Postgres)?;
        let database_url = env::var("DATABASE_URL").ok();
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(Error::Config(
                "DATABASE_URL is required when STORAGE_BACKEND=postgres".to_string(),
            ));
        }

        let fee_paise: i64 = get_env_or("TEST_FEE_PAISE", 50_000)?;

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            storage_backend,
            database_url,
            db_max_connections: get_env_or("DB_MAX_CONNECTIONS", 10)?,
            jwt_secret: get_env("JWT_SECRET")?,
            jwt_ttl_hours: get_env_or("JWT_TTL_HOURS", 24)?,
            email_service_url: get_env("EMAIL_SERVICE_URL")?,
            email_service_token: env::var("EMAIL_SERVICE_TOKEN").ok(),
            razorpay_key_id: get_env("RAZORPAY_KEY_ID")?,
            razorpay_key_secret: get_env("RAZORPAY_KEY_SECRET")?,
            test_fee: Decimal::new(fee_paise, 2),
            test_fee_currency: get_env_or("TEST_FEE_CURRENCY", "INR".to_string())?,
            terms_version: get_env_or("TERMS_VERSION", "v1".to_string())?,
            max_attempts: get_env_or("MAX_ATTEMPTS", 1)?,
            warning_threshold: get_env_or("WARNING_THRESHOLD", 3)?,
            attempt_duration_minutes: get_env_or("ATTEMPT_DURATION_MINUTES", 30)?,
            penalty_factor: get_env_or("PENALTY_FACTOR", 0.0)?,
            passing_threshold: get_env_or("PASSING_THRESHOLD", 60.0)?,
            sweep_interval_secs: get_env_or("SWEEP_INTERVAL_SECS", 60)?,
            max_login_attempts: get_env_or("MAX_LOGIN_ATTEMPTS", 5)?,
            lockout_minutes: get_env_or("LOCKOUT_MINUTES", 15)?,
            admin_emails: parse_email_list(&env::var("ADMIN_EMAILS").unwrap_or_default()),
        })
    }

    pub fn attempt_policy(&self) -> crate::services::attempt_service::AttemptPolicy {
        crate::services::attempt_service::AttemptPolicy {
            max_attempts: self.max_attempts,
            warning_threshold: self.warning_threshold,
            duration: chrono::Duration::minutes(self.attempt_duration_minutes),
        }
    }

    pub fn scoring_policy(&self) -> crate::services::grading_service::ScoringPolicy {
        crate::services::grading_service::ScoringPolicy {
            penalty_factor: self.penalty_factor,
            passing_threshold: self.passing_threshold,
        }
    }

    pub fn account_settings(&self) -> crate::services::student_service::AccountSettings {
        crate::services::student_service::AccountSettings {
            terms_version: self.terms_version.clone(),
            admin_emails: self.admin_emails.clone(),
            lockout: self.lockout_policy(),
        }
    }

    pub fn payment_settings(&self) -> crate::services::payment_service::PaymentSettings {
        crate::services::payment_service::PaymentSettings {
            key_secret: self.razorpay_key_secret.clone(),
            fee: self.test_fee,
            currency: self.test_fee_currency.clone(),
        }
    }

    pub fn lockout_policy(&self) -> crate::services::student_service::LockoutPolicy {
        crate::services::student_service::LockoutPolicy {
            max_login_attempts: self.max_login_attempts,
            lockout: chrono::Duration::minutes(self.lockout_minutes),
        }
    }
}

fn parse_email_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_backend_aliases() {
        assert_eq!("Postgres".parse::<StorageBackend>().unwrap(), StorageBackend::Postgres);
        assert_eq!("document".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert!("mongo-ish".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn missing_optional_value_uses_default() {
        let v: i64 = get_env_or("INTERNSHIP_BACKEND_UNSET_FOR_TEST", 7).unwrap();
        assert_eq!(v, 7);
    }

    #[test]
    fn admin_list_is_normalized() {
        assert_eq!(
            parse_email_list(" Root@Example.com, ,ops@example.com"),
            vec!["root@example.com".to_string(), "ops@example.com".to_string()]
        );
        assert!(parse_email_list("").is_empty());
    }
}
