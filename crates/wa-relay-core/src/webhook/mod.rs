//! Webhook payload model and normalization.
//!
//! The provider batches notifications: one delivery holds entries, each
//! entry holds changes, and each change may carry customer messages and
//! delivery status notifications. [`normalize`] flattens that tree into the
//! units the relay acts on, preserving payload order.
//!
//! Every struct tolerates missing fields; only a body that is not JSON, or
//! whose fields have the wrong JSON types, is rejected.

use crate::jobs::{ButtonReply, InteractiveData, MessageKind, ProcessingJob};
use crate::MerchantId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub mod pipeline;
pub mod signature;

pub use pipeline::{DeliveryReport, WebhookPipeline};
pub use signature::HubSignatureValidator;

/// Content placed in jobs for voice notes and audio attachments
pub const AUDIO_PLACEHOLDER: &str = "[Audio Message]";

/// Only changes of this field carry customer messages
pub const MESSAGES_FIELD: &str = "messages";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum WebhookError {
    #[error("Invalid webhook payload: {message}")]
    InvalidPayload { message: String },

    #[error("Missing X-Hub-Signature-256 header")]
    MissingSignature,

    #[error("Invalid webhook signature: {message}")]
    InvalidSignature { message: String },
}

impl WebhookError {
    /// Whether the error is a signature failure
    pub fn is_security(&self) -> bool {
        matches!(
            self,
            Self::MissingSignature | Self::InvalidSignature { .. }
        )
    }
}

// ============================================================================
// Payload model
// ============================================================================

/// Top-level webhook delivery
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookPayload {
    pub object: String,
    #[serde(deserialize_with = "null_as_default")]
    pub entry: Vec<Entry>,
}

impl WebhookPayload {
    /// Parse a raw request body
    pub fn parse(body: &[u8]) -> Result<Self, WebhookError> {
        serde_json::from_slice(body).map_err(|e| WebhookError::InvalidPayload {
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Entry {
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Change {
    pub field: String,
    #[serde(deserialize_with = "null_as_default")]
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeValue {
    pub messaging_product: String,
    #[serde(deserialize_with = "null_as_default")]
    pub metadata: Metadata,
    #[serde(deserialize_with = "null_as_default")]
    pub contacts: Vec<Contact>,
    #[serde(deserialize_with = "null_as_default")]
    pub messages: Vec<InboundMessage>,
    #[serde(deserialize_with = "null_as_default")]
    pub statuses: Vec<StatusNotification>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub display_phone_number: String,
    pub phone_number_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Contact {
    pub profile: Profile,
    pub wa_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InboundMessage {
    pub from: String,
    pub id: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<TextContent>,
    pub audio: Option<MediaContent>,
    pub image: Option<ImageContent>,
    pub interactive: Option<InteractiveContent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextContent {
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaContent {
    pub id: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageContent {
    pub id: String,
    pub mime_type: String,
    pub sha256: String,
    pub caption: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractiveContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub button_reply: Option<ButtonReply>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusNotification {
    pub id: String,
    pub status: String,
    pub timestamp: String,
    pub recipient_id: String,
}

/// Reads an explicit `null` the same as an absent field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

// ============================================================================
// Normalization
// ============================================================================

/// One inbound message paired with the business phone it was sent to
#[derive(Debug, Clone, PartialEq)]
pub struct MessageUnit {
    pub business_phone: String,
    pub message: InboundMessage,
}

/// A status notification to record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub message_id: String,
    pub status: String,
}

/// Flattened view of one delivery
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedDelivery {
    pub units: Vec<MessageUnit>,
    pub statuses: Vec<StatusUpdate>,
}

impl NormalizedDelivery {
    pub fn is_empty(&self) -> bool {
        self.units.is_empty() && self.statuses.is_empty()
    }
}

/// Flatten a delivery into message units and status updates, in payload order
pub fn normalize(payload: &WebhookPayload) -> NormalizedDelivery {
    let mut delivery = NormalizedDelivery::default();

    for entry in &payload.entry {
        for change in &entry.changes {
            let value = &change.value;

            delivery
                .statuses
                .extend(value.statuses.iter().map(|s| StatusUpdate {
                    message_id: s.id.clone(),
                    status: s.status.clone(),
                }));

            if change.field != MESSAGES_FIELD {
                continue;
            }

            delivery
                .units
                .extend(value.messages.iter().map(|m| MessageUnit {
                    business_phone: value.metadata.display_phone_number.clone(),
                    message: m.clone(),
                }));
        }
    }

    delivery
}

impl MessageUnit {
    pub fn kind(&self) -> MessageKind {
        MessageKind::from_wire(&self.message.kind)
    }

    /// Build the processing job for this unit
    pub fn into_job(self, merchant_id: MerchantId, received_at: DateTime<Utc>) -> ProcessingJob {
        let kind = self.kind();
        let message = self.message;

        let mut job = ProcessingJob {
            message_id: message.id,
            from: message.from,
            to: self.business_phone.clone(),
            kind,
            content: String::new(),
            audio_id: None,
            image_id: None,
            interactive_data: None,
            timestamp: message.timestamp,
            received_at,
            business_phone: self.business_phone,
            merchant_id,
        };

        match kind {
            MessageKind::Text => {
                job.content = message.text.map(|t| t.body).unwrap_or_default();
            }
            MessageKind::Audio => {
                if let Some(audio) = message.audio {
                    job.content = AUDIO_PLACEHOLDER.to_string();
                    job.audio_id = non_empty(audio.id);
                }
            }
            MessageKind::Image => {
                if let Some(image) = message.image {
                    job.content = image.caption;
                    job.image_id = non_empty(image.id);
                }
            }
            MessageKind::Interactive => {
                if let Some(interactive) = message.interactive {
                    if let Some(reply) = &interactive.button_reply {
                        job.content = reply.title.clone();
                    }
                    job.interactive_data = Some(InteractiveData {
                        kind: interactive.kind,
                        button_reply: interactive.button_reply,
                    });
                }
            }
            MessageKind::Unknown => {}
        }

        job
    }
}

fn non_empty(id: String) -> Option<String> {
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
