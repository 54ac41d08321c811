// src/errors.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    UpstreamAuth(String),

    #[error("{0}")]
    UpstreamRejected(String),

    /// The provider could not be reached or answered with something unreadable.
    #[error("{0}")]
    UpstreamUnavailable(String),

    #[error("Missing public_id in Callback URL")]
    MissingCorrelationId,

    #[error("Malformed callback: {0}")]
    MalformedCallback(String),

    #[error("{0}")]
    Persistence(String),

    #[error("Missing or invalid session token")]
    Unauthorized,

    #[error("Session is not scoped to this payment")]
    Forbidden,

    #[error("Payment not found")]
    NotFound,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamAuth(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::UpstreamRejected(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::MissingCorrelationId => StatusCode::BAD_REQUEST,
            AppError::MalformedCallback(_) => StatusCode::BAD_REQUEST,
            AppError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::Persistence(format!("Database error: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::UpstreamUnavailable(format!("HTTP request failed: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        tracing::debug!(error = %err, "session token rejected");
        AppError::Unauthorized
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

// Helper conversion functions
impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn upstream_auth(msg: impl Into<String>) -> Self {
        AppError::UpstreamAuth(msg.into())
    }

    pub fn upstream_rejected(msg: impl Into<String>) -> Self {
        AppError::UpstreamRejected(msg.into())
    }

    pub fn upstream_unavailable(msg: impl Into<String>) -> Self {
        AppError::UpstreamUnavailable(msg.into())
    }

    pub fn malformed_callback(msg: impl Into<String>) -> Self {
        AppError::MalformedCallback(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        AppError::Persistence(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::Configuration(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
