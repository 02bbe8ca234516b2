//! Error types for fedipost
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
///
/// Identity/key errors (`KeyNotFound`, `InvalidKey`) are fatal to a whole
/// dispatch. `DeliveryTransport` is scoped to a single recipient and never
/// escapes the fan-out.
#[derive(Debug, Error)]
pub enum AppError {
    /// Sender's private key could not be resolved (500)
    #[error("No private key found for {0}")]
    KeyNotFound(String),

    /// Private key exists but cannot be parsed (500)
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    /// Account has an empty or absent follower list (400)
    #[error("No followers for account {0}")]
    NoFollowers(String),

    /// Network failure or non-2xx response from a recipient inbox (502)
    #[error("Delivery to {inbox} failed: {reason}")]
    DeliveryTransport { inbox: String, reason: String },

    /// API key mismatch (403)
    #[error("wrong api key")]
    Unauthorized,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP client error (502)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// JSON serialization error (500)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::KeyNotFound(_) => "key_not_found",
            AppError::InvalidKey(_) => "invalid_key",
            AppError::NoFollowers(_) => "no_followers",
            AppError::DeliveryTransport { .. } => "delivery_transport",
            AppError::Unauthorized => "unauthorized",
            AppError::Validation(_) => "validation",
            AppError::Database(_) => "database",
            AppError::HttpClient(_) => "http_client",
            AppError::Serialization(_) => "serialization",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::FORBIDDEN,
            AppError::NoFollowers(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::DeliveryTransport { .. } | AppError::HttpClient(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        use axum::Json;

        let status = self.status_code();
        let error_message = match &self {
            AppError::Database(_) => "Database error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        crate::metrics::ERRORS_TOTAL
            .with_label_values(&[self.kind()])
            .inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
