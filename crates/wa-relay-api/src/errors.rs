//! Error types for the HTTP service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::{error, warn};
use wa_relay_core::{SendError, WebhookError};

/// Handler errors with HTTP status code mapping.
///
/// Client-facing messages are fixed strings; details are logged server-side.
///
/// | Variant                | Status | Body `error`                  |
/// |------------------------|--------|-------------------------------|
/// | `VerificationFailed`   | 403    | `Verification failed`         |
/// | `InvalidPayload`       | 400    | `Invalid payload`             |
/// | `Unauthorized`         | 401    | `Invalid signature`           |
/// | `InvalidMessageFormat` | 400    | `Invalid message format`      |
/// | `SendFailed`           | 500    | `Failed to send message`      |
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Subscription handshake with a wrong mode or token
    #[error("Verification failed")]
    VerificationFailed,

    /// Webhook body is not a valid provider payload
    #[error("Invalid payload: {0}")]
    InvalidPayload(WebhookError),

    /// Webhook signature missing or wrong
    #[error("Unauthorized: {0}")]
    Unauthorized(WebhookError),

    /// `/send` body is not a valid outbound message
    #[error("Invalid message format: {message}")]
    InvalidMessageFormat { message: String },

    /// Provider send API call failed
    #[error("Failed to send message: {0}")]
    SendFailed(#[from] SendError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::VerificationFailed => StatusCode::FORBIDDEN,
            Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::InvalidMessageFormat { .. } => StatusCode::BAD_REQUEST,
            Self::SendFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn client_message(&self) -> &'static str {
        match self {
            Self::VerificationFailed => "Verification failed",
            Self::InvalidPayload(_) => "Invalid payload",
            Self::Unauthorized(_) => "Invalid signature",
            Self::InvalidMessageFormat { .. } => "Invalid message format",
            Self::SendFailed(_) => "Failed to send message",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let body = serde_json::json!({
            "error": self.client_message(),
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        (status, Json(body)).into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Health check failed: {message}")]
    HealthCheckFailed { message: String },
}

impl ServiceError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BindFailed { .. } => 1,
            Self::ServerFailed { .. } => 2,
            Self::Configuration(_) => 3,
            Self::HealthCheckFailed { .. } => 4,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
