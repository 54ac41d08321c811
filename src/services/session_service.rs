// services/session_service.rs
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::errors::{AppError, Result};

/// Claims of an anonymous watcher session. The token grants read access to
/// exactly one payment.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionClaims {
    pub sub: String,
    pub public_id: String,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Clone)]
pub struct SessionService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_secs: i64,
}

/// A freshly issued session token.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub claims: SessionClaims,
}

impl SessionService {
    pub fn new(config: &SessionConfig) -> Self {
        let secret = config.secret.expose_secret().as_bytes();
        SessionService {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl_secs: config.ttl_secs,
        }
    }

    pub fn issue(&self, public_id: &str) -> Result<IssuedSession> {
        if Uuid::parse_str(public_id).is_err() {
            return Err(AppError::validation("public_id must be a UUID"));
        }

        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: Uuid::new_v4().to_string(),
            public_id: public_id.to_string(),
            iat: now as usize,
            exp: (now + self.ttl_secs) as usize,
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::configuration(format!("Failed to sign session: {}", e)))?;

        tracing::debug!(%public_id, session = %claims.sub, "watcher session issued");
        Ok(IssuedSession { token, claims })
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        let data = decode::<SessionClaims>(
            token,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        )?;
        Ok(data.claims)
    }
}
