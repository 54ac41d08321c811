// handlers/status_handlers.rs
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};

use crate::dtos::payment_dtos::{PaymentStatusResponse, SessionRequest, SessionResponse};
use crate::errors::{AppError, Result};
use crate::middleware::auth::PaymentSession;
use crate::state::AppState;

/// Issues an anonymous session scoped to one payment.
pub async fn create_session(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SessionRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>> {
    let Json(request) = payload.map_err(|e| AppError::validation(e.body_text()))?;

    let issued = state.sessions.issue(&request.public_id)?;
    Ok(Json(SessionResponse {
        token: issued.token,
        expires_at: issued.claims.exp as i64,
    }))
}

pub async fn get_payment_status(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
    session: PaymentSession,
) -> Result<Json<PaymentStatusResponse>> {
    session.authorize(&public_id)?;

    let status = state.payments.status(&public_id).await?;
    Ok(Json(PaymentStatusResponse { public_id, status }))
}

/// Server-sent `status` events for one payment. The stream ends after the
/// first terminal status.
pub async fn payment_events(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
    session: PaymentSession,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>>> {
    session.authorize(&public_id)?;

    let changes = state.payments.subscribe(&public_id).await?;
    tracing::debug!(%public_id, "status subscriber attached");

    let events = futures::stream::unfold((changes, false), |(mut changes, finished)| async move {
        if finished {
            return None;
        }
        match changes.next().await? {
            Ok(change) => {
                let terminal = change.status.is_terminal();
                let event = Event::default().event("status").json_data(&change);
                Some((event, (changes, terminal)))
            }
            Err(e) => {
                tracing::warn!(error = %e, "status subscription failed");
                None
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
