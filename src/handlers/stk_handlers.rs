// handlers/stk_handlers.rs
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    Json,
};

use crate::dtos::payment_dtos::{
    CallbackAck, CallbackQuery, InitiatePaymentRequest, InitiatePaymentResponse,
};
use crate::errors::{AppError, Result};
use crate::state::AppState;

pub async fn initiate_stk_push(
    State(state): State<AppState>,
    payload: std::result::Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> Result<Json<InitiatePaymentResponse>> {
    let Json(request) = payload.map_err(|e| AppError::validation(e.body_text()))?;

    let public_id = state.payments.initiate(request).await?;
    Ok(Json(InitiatePaymentResponse { public_id }))
}

/// Provider callback. Every outcome answers with the acknowledgment shape the
/// provider's integration contract requires.
pub async fn stk_callback(
    State(state): State<AppState>,
    query: Option<Query<CallbackQuery>>,
    body: Bytes,
) -> (StatusCode, Json<CallbackAck>) {
    let public_id = query.and_then(|Query(query)| query.public_id);

    match state
        .payments
        .apply_callback(public_id.as_deref(), &body)
        .await
    {
        Ok(_) => (StatusCode::OK, Json(CallbackAck::accept())),
        Err(e) => (e.status_code(), Json(CallbackAck::reject(e.to_string()))),
    }
}
