// services/payment_service.rs
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::database::{PaymentStore, StatusStream};
use crate::dtos::payment_dtos::InitiatePaymentRequest;
use crate::errors::{AppError, Result};
use crate::models::mpesa_callback::ParsedCallback;
use crate::models::payment::{PaymentRecord, PaymentStatus};
use crate::services::mpesa_service::{normalize_phone, MpesaService};

/// Initiation and callback handling on top of the provider client and the
/// store. Holds no per-payment state; the callback URL carries correlation.
#[derive(Clone)]
pub struct PaymentService {
    mpesa: Arc<MpesaService>,
    store: Arc<dyn PaymentStore>,
}

impl PaymentService {
    pub fn new(mpesa: Arc<MpesaService>, store: Arc<dyn PaymentStore>) -> Self {
        PaymentService { mpesa, store }
    }

    pub fn store(&self) -> &Arc<dyn PaymentStore> {
        &self.store
    }

    /// Sends the push and records it as pending. Returns the public id.
    ///
    /// No record is written unless the provider accepted the push.
    pub async fn initiate(&self, request: InitiatePaymentRequest) -> Result<String> {
        let phone = request
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|phone| !phone.is_empty());
        let amount = request.amount.filter(|amount| *amount > 0);

        let (Some(phone), Some(amount)) = (phone, amount) else {
            return Err(AppError::validation("Missing phone or amount"));
        };
        request.validate()?;

        let phone = normalize_phone(phone)?;
        let public_id = Uuid::new_v4().to_string();

        info!(%public_id, amount, "Initiating STK push");
        let accepted = self
            .mpesa
            .initiate_stk_push(&phone, amount, &public_id)
            .await?;

        let record = PaymentRecord::pending(
            public_id.clone(),
            accepted.checkout_request_id.clone(),
            accepted.merchant_request_id,
            phone,
            amount,
        );

        // The provider already holds this push; a failed insert leaves the
        // customer prompted with nothing to correlate the callback against.
        self.store.insert(&record).await.map_err(|e| {
            error!(
                %public_id,
                checkout_request_id = %accepted.checkout_request_id,
                error = %e,
                "Pending payment not persisted after provider accepted the push"
            );
            AppError::persistence("DB insert failed")
        })?;

        Ok(public_id)
    }

    /// Applies a provider callback. Returns the number of records updated.
    pub async fn apply_callback(&self, public_id: Option<&str>, body: &[u8]) -> Result<u64> {
        let public_id = public_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                error!("Callback URL missing public_id query parameter");
                AppError::MissingCorrelationId
            })?;

        let parsed = ParsedCallback::from_slice(body).map_err(|e| {
            error!(%public_id, error = %e, "Rejected provider callback");
            e
        })?;

        let matched = self
            .store
            .update_status(public_id, &parsed.outcome)
            .await
            .map_err(|e| {
                error!(%public_id, error = %e, "Payment status update failed");
                AppError::persistence("Failed to update payment")
            })?;

        if matched == 0 {
            warn!(
                %public_id,
                checkout_request_id = %parsed.checkout_request_id,
                "Callback for unknown payment"
            );
        } else {
            info!(
                %public_id,
                checkout_request_id = %parsed.checkout_request_id,
                result_code = parsed.outcome.result_code,
                status = %parsed.outcome.status,
                "Payment status updated"
            );
        }

        Ok(matched)
    }

    pub async fn status(&self, public_id: &str) -> Result<PaymentStatus> {
        self.store
            .find(public_id)
            .await?
            .map(|record| record.status)
            .ok_or(AppError::NotFound)
    }

    pub async fn subscribe(&self, public_id: &str) -> Result<StatusStream> {
        self.store.subscribe(public_id).await
    }
}
