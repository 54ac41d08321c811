//! STK push relay: initiates M-Pesa STK pushes, records the provider's
//! asynchronous callback, and relays the outcome to watching clients.

pub mod config;
pub mod database;
pub mod dtos;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod watcher;

use axum::{extract::State, http::Method, response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use state::AppState;

pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    Router::new()
        .route("/health", get(health_check))
        .merge(routes::stk::stk_routes())
        .merge(routes::payments::payment_routes())
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .layer(cors)
        .with_state(app_state)
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let store = state.store();
    let store_status = match store.ping().await {
        Ok(()) => "connected",
        Err(_) => "disconnected",
    };

    Json(json!({
        "status": "healthy",
        "store": store.backend(),
        "store_status": store_status,
        "mpesa_environment": state.mpesa_service.config().environment.as_str(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
