// config.rs
use secrecy::{ExposeSecret, Secret};
use std::env;

use crate::errors::{AppError, Result};

const SANDBOX_BASE_URL: &str = "https://sandbox.safaricom.co.ke";
const PRODUCTION_BASE_URL: &str = "https://api.safaricom.co.ke";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpesaEnvironment {
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sandbox" | "" => Ok(MpesaEnvironment::Sandbox),
            "production" | "live" => Ok(MpesaEnvironment::Production),
            other => Err(AppError::configuration(format!(
                "MPESA_ENVIRONMENT must be 'sandbox' or 'production', got '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MpesaEnvironment::Sandbox => "sandbox",
            MpesaEnvironment::Production => "production",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub consumer_key: Secret<String>,
    pub consumer_secret: Secret<String>,
    pub short_code: String,
    pub passkey: Secret<String>,
    pub callback_url: String,
    pub environment: MpesaEnvironment,
    /// Overrides the environment's base URL (used against local mocks).
    pub base_url: Option<String>,
    pub account_reference: String,
    pub transaction_desc: String,
}

/// Provider endpoints resolved from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpesaUrls {
    pub auth_url: String,
    pub stk_url: String,
}

impl MpesaConfig {
    pub fn urls(&self) -> MpesaUrls {
        let base_url = match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => match self.environment {
                MpesaEnvironment::Production => PRODUCTION_BASE_URL.to_string(),
                MpesaEnvironment::Sandbox => SANDBOX_BASE_URL.to_string(),
            },
        };

        MpesaUrls {
            auth_url: format!("{}/oauth/v1/generate?grant_type=client_credentials", base_url),
            stk_url: format!("{}/mpesa/stkpush/v1/processrequest", base_url),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == MpesaEnvironment::Production
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: Secret<String>,
    pub ttl_secs: i64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mpesa: MpesaConfig,
    /// `None` selects the in-memory store.
    pub database: Option<DatabaseConfig>,
    pub session: SessionConfig,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests need not touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| AppError::configuration(format!("{} must be set", key)))
        };

        let environment =
            MpesaEnvironment::parse(&get("MPESA_ENVIRONMENT").unwrap_or_default())?;

        let short_code = match get("MPESA_SHORTCODE") {
            Some(code) => code,
            None => require("MPESA_SHORT_CODE")
                .map_err(|_| AppError::configuration("MPESA_SHORTCODE must be set"))?,
        };

        let mpesa = MpesaConfig {
            consumer_key: Secret::new(require("MPESA_CONSUMER_KEY")?),
            consumer_secret: Secret::new(require("MPESA_CONSUMER_SECRET")?),
            short_code,
            passkey: Secret::new(require("MPESA_PASSKEY")?),
            callback_url: require("MPESA_CALLBACK_URL")?,
            environment,
            base_url: get("MPESA_BASE_URL"),
            account_reference: get("MPESA_ACCOUNT_REFERENCE")
                .unwrap_or_else(|| "STK Relay".to_string()),
            transaction_desc: get("MPESA_TRANSACTION_DESC")
                .unwrap_or_else(|| "Payment".to_string()),
        };

        let database = get("DATABASE_URL").map(|url| DatabaseConfig {
            url: Secret::new(url),
            name: get("DATABASE_NAME").unwrap_or_else(|| "stk_relay".to_string()),
        });

        let ttl_secs = match get("SESSION_TTL_SECS") {
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                AppError::configuration("SESSION_TTL_SECS must be a number of seconds")
            })?,
            None => 3600,
        };

        let session = SessionConfig {
            secret: Secret::new(require("SESSION_SECRET")?),
            ttl_secs,
        };

        let port = match get("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| AppError::configuration("PORT must be a number"))?,
            None => 3000,
        };

        Ok(AppConfig {
            mpesa,
            database,
            session,
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
        })
    }

    /// Redacted summary for startup logs.
    pub fn get_config_info(&self) -> serde_json::Value {
        serde_json::json!({
            "environment": self.mpesa.environment.as_str(),
            "is_production": self.mpesa.is_production(),
            "business_shortcode": self.mpesa.short_code,
            "callback_url": self.mpesa.callback_url,
            "consumer_key_set": !self.mpesa.consumer_key.expose_secret().is_empty(),
            "consumer_secret_set": !self.mpesa.consumer_secret.expose_secret().is_empty(),
            "store": if self.database.is_some() { "mongodb" } else { "memory" },
            "port": self.port,
            "host": self.host,
        })
    }
}
