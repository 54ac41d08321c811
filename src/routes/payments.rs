use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::status_handlers;
use crate::state::AppState;

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/session", post(status_handlers::create_session))
        .route("/payments/:public_id", get(status_handlers::get_payment_status))
        .route("/payments/:public_id/events", get(status_handlers::payment_events))
}
