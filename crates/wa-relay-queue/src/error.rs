//! Error types for queue operations.

use chrono::Duration;
use thiserror::Error;

/// Errors raised by queue clients and providers
#[derive(Debug, Error)]
pub enum QueueError {
    /// The broker does not know the queue
    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Queue '{queue_name}' is full ({max_size} messages)")]
    QueueFull { queue_name: String, max_size: usize },

    /// The receipt was already settled, or its channel has gone away
    #[error("Receipt is no longer valid: {receipt}")]
    ReceiptNotFound { receipt: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    /// Any other broker-side failure
    #[error("{provider} broker error: {message}")]
    Broker { provider: String, message: String },

    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),
}

impl QueueError {
    /// Whether repeating the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::QueueFull { .. }
                | Self::Timeout { .. }
                | Self::ConnectionFailed { .. }
                | Self::Broker { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    /// URL scheme that selects no provider; the URL is already redacted
    #[error("Unsupported queue URL: {url}")]
    UnsupportedScheme { url: String },
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
