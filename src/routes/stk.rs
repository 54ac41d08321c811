use axum::{routing::post, Router};

use crate::handlers::stk_handlers;
use crate::state::AppState;

pub fn stk_routes() -> Router<AppState> {
    Router::new()
        .route("/initiate", post(stk_handlers::initiate_stk_push))
        .route("/callback", post(stk_handlers::stk_callback))
}
