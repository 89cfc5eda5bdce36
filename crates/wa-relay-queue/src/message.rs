//! Queue names, message identifiers and the messages that travel through a queue.

use crate::error::ValidationError;
use crate::provider::ProviderType;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Name of a durable queue on the broker.
///
/// Restricted to ASCII alphanumerics, `-`, `_` and `.`, at most 255 bytes,
/// and never starting with the broker-reserved `amq.` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueName(String);

impl QueueName {
    pub fn new(name: String) -> Result<Self, ValidationError> {
        if name.is_empty() || name.len() > 255 {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: "must be 1-255 characters".to_string(),
            });
        }

        let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.');
        if !name.chars().all(allowed) {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric, '-', '_' and '.' allowed".to_string(),
            });
        }

        if name.starts_with("amq.") {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "the 'amq.' prefix is reserved".to_string(),
            });
        }

        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier the queue layer assigns to a message.
///
/// AMQP carries it in the `message_id` property so it survives redelivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    /// Fresh random identifier
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Outbound message: an opaque body plus broker properties
#[derive(Debug, Clone)]
pub struct Message {
    pub body: Bytes,
    /// Sent as AMQP headers
    pub attributes: HashMap<String, String>,
    pub correlation_id: Option<String>,
    pub content_type: Option<String>,
    /// Ask the broker to write the message to disk before routing it
    pub persistent: bool,
}

impl Message {
    pub fn new(body: Bytes) -> Self {
        Self {
            body,
            attributes: HashMap::new(),
            correlation_id: None,
            content_type: None,
            persistent: false,
        }
    }

    pub fn with_attribute(mut self, key: String, value: String) -> Self {
        self.attributes.insert(key, value);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: String) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }
}

/// A delivered message that must be settled through its receipt handle
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub body: Bytes,
    pub attributes: HashMap<String, String>,
    pub correlation_id: Option<String>,
    pub content_type: Option<String>,
    pub receipt_handle: ReceiptHandle,
    /// Deliveries so far, including this one
    pub delivery_count: u32,
    pub delivered_at: DateTime<Utc>,
}

impl ReceivedMessage {
    /// The same body and properties as a new persistent message
    pub fn message(&self) -> Message {
        Message {
            body: self.body.clone(),
            attributes: self.attributes.clone(),
            correlation_id: self.correlation_id.clone(),
            content_type: self.content_type.clone(),
            persistent: true,
        }
    }

    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}

/// Settlement token for one delivery.
///
/// For AMQP the handle is the delivery tag; it is only valid on the channel
/// that received the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptHandle {
    handle: String,
    queue: QueueName,
    provider_type: ProviderType,
}

impl ReceiptHandle {
    pub fn new(handle: String, queue: QueueName, provider_type: ProviderType) -> Self {
        Self {
            handle,
            queue,
            provider_type,
        }
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Queue the message was received from
    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    pub fn provider_type(&self) -> ProviderType {
        self.provider_type
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
