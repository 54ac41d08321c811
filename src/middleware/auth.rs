use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::{header, request::Parts},
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::services::session_service::SessionClaims;
use crate::state::AppState;

/// A verified watcher session.
///
/// The token is read from `Authorization: Bearer ..`, or from a `token`
/// query parameter for event-stream clients that cannot set headers.
#[derive(Debug, Clone)]
pub struct PaymentSession(pub SessionClaims);

impl PaymentSession {
    /// Row-level rule: a session only sees the payment it was issued for.
    pub fn authorize(&self, public_id: &str) -> Result<(), AppError> {
        if self.0.public_id == public_id {
            Ok(())
        } else {
            tracing::warn!(
                session = %self.0.sub,
                requested = %public_id,
                "session used for another payment"
            );
            Err(AppError::Forbidden)
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn token_from_query(parts: &Parts) -> Option<String> {
    let Query(query) = Query::<TokenQuery>::try_from_uri(&parts.uri).ok()?;
    query.token.filter(|token| !token.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for PaymentSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::to_string)
            .or_else(|| token_from_query(parts))
            .ok_or(AppError::Unauthorized)?;

        let claims = state.sessions.verify(&token)?;
        Ok(PaymentSession(claims))
    }
}
