//! # wa-relay core
//!
//! Domain logic for relaying WhatsApp Business webhook traffic between the
//! messaging provider and the downstream message workers.
//!
//! Inbound: webhook deliveries are normalized into [`jobs::ProcessingJob`]s,
//! attributed to a merchant through a cache-aside lookup and published to
//! the processing queue. Outbound: replies placed on the outgoing queue are
//! relayed through the provider's send API with explicit ack/requeue handling.
//!
//! ## Architecture
//!
//! - Business logic depends only on trait abstractions (cache, store, queue, gateway)
//! - Infrastructure implementations live in [`adapters`] and are injected at runtime
//! - Metrics go through an injected [`monitoring::MetricsCollector`]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ============================================================================
// Domain Identifier Types
// ============================================================================

/// Identifier of the merchant (tenant) that owns a business phone number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MerchantId(String);

impl MerchantId {
    /// Rejects blank ids and ids longer than 64 bytes
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "merchant_id".to_string(),
            });
        }

        if value.len() > 64 {
            return Err(ValidationError::TooLong {
                field: "merchant_id".to_string(),
                max_length: 64,
            });
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MerchantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MerchantId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Business phone number as reported by the provider's webhook metadata.
///
/// Kept verbatim: it is both the cache key component and the store lookup
/// value, so no normalization is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "phone_number".to_string(),
            });
        }

        if value.len() > 32 {
            return Err(ValidationError::TooLong {
                field: "phone_number".to_string(),
                max_length: 32,
            });
        }

        if !value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'))
        {
            return Err(ValidationError::InvalidCharacters {
                field: "phone_number".to_string(),
                invalid_chars: "only digits, '+', ' ', '-', '(' and ')' allowed".to_string(),
            });
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PhoneNumber {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ============================================================================
// Secrets
// ============================================================================

/// A secret string that is wiped from memory on drop and never printed.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop, Deserialize)]
#[serde(transparent)]
pub struct SecretValue {
    inner: String,
}

impl SecretValue {
    pub fn from_string(value: String) -> Self {
        Self { inner: value }
    }

    /// The raw value. Do not store or log the result.
    pub fn expose_secret(&self) -> &str {
        &self.inner
    }

    /// Whether the secret holds no value
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<REDACTED>")
    }
}

impl Serialize for SecretValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("<REDACTED>")
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Coarse classification attached to failures in logs and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Worth retrying
    Transient,
    /// Retrying gives the same answer
    Permanent,
    /// Security-related failures (bad signatures, rejected credentials)
    Security,
    Configuration,
}

impl ErrorCategory {
    /// Label value used in metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Security => "security",
            Self::Configuration => "configuration",
        }
    }
}

/// A domain value failed its constructor checks
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' has invalid format: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    TooLong { field: String, max_length: usize },

    #[error("Field '{field}' contains invalid characters: {invalid_chars}")]
    InvalidCharacters {
        field: String,
        invalid_chars: String,
    },
}

/// Infrastructure implementations of the storage traits
pub mod adapters;

/// Key/value cache abstraction
pub mod cache;

/// Queue payloads exchanged with downstream workers
pub mod jobs;

/// Processing-queue publisher
pub mod job_publisher;

/// Metrics collection capability
pub mod monitoring;

/// Outgoing reply consumer
pub mod outgoing;

/// Provider send API client
pub mod send_gateway;

/// Delivery status tracking
pub mod status_tracker;

/// Merchant resolution
pub mod tenant;

/// Webhook payload model, normalization and processing pipeline
pub mod webhook;

pub use cache::{CacheError, KeyValueCache};
pub use job_publisher::{JobPublisher, PublishError, QueueJobPublisher};
pub use jobs::{MessageKind, OutgoingJob, ProcessingJob};
pub use monitoring::{MetricsCollector, NoOpMetricsCollector};
pub use outgoing::{DeliveryOutcome, OutgoingConsumer, OutgoingDeliveryHandler};
pub use send_gateway::{OutboundMessage, SendError, SendGateway, WhatsAppSendGateway};
pub use status_tracker::{CacheStatusTracker, StatusTracker};
pub use tenant::{CacheAsideMerchantResolver, MerchantResolver, MerchantStore, ResolveError, StoreError};
pub use webhook::{WebhookError, WebhookPayload, WebhookPipeline};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
