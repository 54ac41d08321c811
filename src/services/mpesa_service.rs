// services/mpesa_service.rs
use base64::{engine::general_purpose::STANDARD as base64, Engine as _};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{header, Client, Url};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::config::MpesaConfig;
use crate::errors::{AppError, Result};

const TOKEN_ERROR: &str = "Failed to get access token from Safaricom";
const MISSING_CHECKOUT_ID: &str = "Safaricom did not return CheckoutRequestID";
const DEFAULT_TOKEN_TTL_SECS: i64 = 3599;

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StkPushRequest {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "TransactionType")]
    pub transaction_type: String,
    #[serde(rename = "Amount")]
    pub amount: u64,
    #[serde(rename = "PartyA")]
    pub party_a: String,
    #[serde(rename = "PartyB")]
    pub party_b: String,
    #[serde(rename = "PhoneNumber")]
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    #[serde(rename = "AccountReference")]
    pub account_reference: String,
    #[serde(rename = "TransactionDesc")]
    pub transaction_desc: String,
}

/// Push response. Rejections often arrive as a body without
/// `CheckoutRequestID`, so every field is optional.
#[derive(Debug, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: Option<String>,
    #[serde(rename = "ResponseCode")]
    pub response_code: Option<String>,
    #[serde(rename = "ResponseDescription")]
    pub response_description: Option<String>,
    #[serde(rename = "CustomerMessage")]
    pub customer_message: Option<String>,
    #[serde(rename = "errorCode")]
    pub error_code: Option<String>,
    #[serde(rename = "errorMessage")]
    pub error_message: Option<String>,
}

/// A push the provider accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct StkPushAccepted {
    pub checkout_request_id: String,
    pub merchant_request_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MpesaService {
    config: MpesaConfig,
    client: Client,
    cached_token: Arc<RwLock<Option<(String, DateTime<Utc>)>>>,
}

/// Normalizes Safaricom numbers to `2547XXXXXXXX` / `2541XXXXXXXX`.
///
/// Accepts `07..`/`01..`, `2547..`, `+2547..` and the bare nine-digit form.
pub fn normalize_phone(raw: &str) -> Result<String> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

    let subscriber = if let Some(rest) = compact.strip_prefix("+254") {
        rest
    } else if let Some(rest) = compact.strip_prefix("254") {
        rest
    } else if let Some(rest) = compact.strip_prefix('0') {
        rest
    } else {
        compact.as_str()
    };

    let valid = subscriber.len() == 9
        && subscriber.chars().all(|c| c.is_ascii_digit())
        && (subscriber.starts_with('7') || subscriber.starts_with('1'));

    if !valid {
        return Err(AppError::validation("Enter a valid Safaricom number"));
    }

    Ok(format!("254{}", subscriber))
}

/// `YYYYMMDDHHMMSS`, the format the push API expects.
pub fn timestamp_for(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

impl MpesaService {
    pub fn new(config: MpesaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(MpesaService {
            config,
            client,
            cached_token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn config(&self) -> &MpesaConfig {
        &self.config
    }

    /// Base64 of shortcode + passkey + timestamp.
    pub fn generate_password(&self, timestamp: &str) -> String {
        let password_string = format!(
            "{}{}{}",
            self.config.short_code,
            self.config.passkey.expose_secret(),
            timestamp
        );
        base64.encode(password_string)
    }

    /// Callback URL with the correlation id appended as `public_id`.
    pub fn callback_url_for(&self, public_id: &str) -> Result<String> {
        let mut url = Url::parse(&self.config.callback_url).map_err(|e| {
            AppError::configuration(format!("MPESA_CALLBACK_URL is not a valid URL: {}", e))
        })?;
        url.query_pairs_mut().append_pair("public_id", public_id);
        Ok(url.to_string())
    }

    pub async fn get_access_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().await;
            if let Some((token, expiry)) = cached.as_ref() {
                if *expiry > Utc::now() {
                    return Ok(token.clone());
                }
            }
        }

        info!("Requesting new M-Pesa access token");
        let auth_url = self.config.urls().auth_url;

        let response = self
            .client
            .get(&auth_url)
            .basic_auth(
                self.config.consumer_key.expose_secret(),
                Some(self.config.consumer_secret.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "M-Pesa token endpoint unreachable");
                AppError::upstream_auth(TOKEN_ERROR)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, %body, "Failed to get access token");
            return Err(AppError::upstream_auth(TOKEN_ERROR));
        }

        let auth_response: AuthResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Unreadable token response");
            AppError::upstream_auth(TOKEN_ERROR)
        })?;

        let ttl = auth_response
            .expires_in
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS);

        {
            // Refresh a minute early so a token never expires mid-request.
            let expiry_time = Utc::now() + ChronoDuration::seconds((ttl - 60).max(0));
            let mut cached = self.cached_token.write().await;
            *cached = Some((auth_response.access_token.clone(), expiry_time));
        }

        info!(ttl_secs = ttl, "M-Pesa access token obtained");
        Ok(auth_response.access_token)
    }

    /// Sends the push. `phone` must already be normalized.
    pub async fn initiate_stk_push(
        &self,
        phone: &str,
        amount: u64,
        public_id: &str,
    ) -> Result<StkPushAccepted> {
        let access_token = self.get_access_token().await?;
        let timestamp = timestamp_for(Utc::now());
        let password = self.generate_password(&timestamp);

        let stk_request = StkPushRequest {
            business_short_code: self.config.short_code.clone(),
            password,
            timestamp,
            transaction_type: "CustomerPayBillOnline".to_string(),
            amount,
            party_a: phone.to_string(),
            party_b: self.config.short_code.clone(),
            phone_number: phone.to_string(),
            callback_url: self.callback_url_for(public_id)?,
            account_reference: self.config.account_reference.clone(),
            transaction_desc: self.config.transaction_desc.clone(),
        };

        let response = self
            .client
            .post(self.config.urls().stk_url)
            .header(header::AUTHORIZATION, format!("Bearer {}", access_token))
            .json(&stk_request)
            .send()
            .await
            .map_err(|e| {
                error!(%public_id, error = %e, "STK push request failed");
                AppError::upstream_unavailable(format!("STK push request failed: {}", e))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!(%public_id, %status, error = %e, "STK push response not received");
            AppError::upstream_unavailable(format!("STK push request failed: {}", e))
        })?;

        // Rejections are signalled by a missing CheckoutRequestID as often as
        // by the HTTP status, so a readable body decides. An unreadable one
        // means the provider is down, not that it refused the push.
        let stk_response: StkPushResponse = serde_json::from_str(&body).map_err(|e| {
            error!(%public_id, %status, error = %e, "Unreadable STK push response");
            AppError::upstream_unavailable(format!(
                "Unreadable response from Safaricom (HTTP {})",
                status.as_u16()
            ))
        })?;

        match stk_response.checkout_request_id.filter(|id| !id.is_empty()) {
            Some(checkout_request_id) => {
                info!(
                    %public_id,
                    %checkout_request_id,
                    customer_message = stk_response.customer_message.as_deref().unwrap_or("-"),
                    "STK push accepted"
                );
                Ok(StkPushAccepted {
                    checkout_request_id,
                    merchant_request_id: stk_response.merchant_request_id,
                })
            }
            None => {
                error!(
                    %public_id,
                    %status,
                    error_code = stk_response.error_code.as_deref().unwrap_or("-"),
                    "STK push rejected"
                );
                Err(AppError::upstream_rejected(
                    stk_response
                        .error_message
                        .unwrap_or_else(|| MISSING_CHECKOUT_ID.to_string()),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MpesaEnvironment;
    use chrono::TimeZone;
    use secrecy::Secret;

    fn test_config() -> MpesaConfig {
        MpesaConfig {
            consumer_key: Secret::new("key".to_string()),
            consumer_secret: Secret::new("secret".to_string()),
            short_code: "174379".to_string(),
            passkey: Secret::new("passkey".to_string()),
            callback_url: "https://example.com/callback".to_string(),
            environment: MpesaEnvironment::Sandbox,
            base_url: None,
            account_reference: "STK Relay".to_string(),
            transaction_desc: "Payment".to_string(),
        }
    }

    #[test]
    fn normalizes_local_and_international_forms() {
        assert_eq!(normalize_phone("0712345678").unwrap(), "254712345678");
        assert_eq!(normalize_phone("+254712345678").unwrap(), "254712345678");
        assert_eq!(normalize_phone("254712345678").unwrap(), "254712345678");
        assert_eq!(normalize_phone("712345678").unwrap(), "254712345678");
        assert_eq!(normalize_phone("0112 345 678").unwrap(), "254112345678");
    }

    #[test]
    fn rejects_invalid_numbers() {
        for phone in ["", "07123", "0812345678", "25471234567a", "+1 555 0100", "07123456789"] {
            assert!(
                matches!(normalize_phone(phone), Err(AppError::Validation(_))),
                "{} should be rejected",
                phone
            );
        }
    }

    #[test]
    fn timestamp_is_fourteen_digits() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(timestamp_for(at), "20240307090501");
    }

    #[test]
    fn password_is_base64_of_shortcode_passkey_timestamp() {
        let service = MpesaService::new(test_config()).unwrap();
        let password = service.generate_password("20240307090501");
        let decoded = base64.decode(password).unwrap();
        assert_eq!(decoded, b"174379passkey20240307090501");
    }

    #[test]
    fn callback_url_carries_public_id() {
        let service = MpesaService::new(test_config()).unwrap();
        assert_eq!(
            service.callback_url_for("abc-123").unwrap(),
            "https://example.com/callback?public_id=abc-123"
        );

        let mut config = test_config();
        config.callback_url = "https://example.com/hooks?source=mpesa".to_string();
        let service = MpesaService::new(config).unwrap();
        assert_eq!(
            service.callback_url_for("abc").unwrap(),
            "https://example.com/hooks?source=mpesa&public_id=abc"
        );
    }
}
