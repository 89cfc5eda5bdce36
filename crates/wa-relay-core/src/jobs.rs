//! Queue payloads exchanged with downstream workers.
//!
//! Both types are serialized as flat JSON objects; optional fields are
//! omitted when absent so downstream consumers can rely on key presence.

use crate::MerchantId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized kind of an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Audio,
    Image,
    Interactive,
    Unknown,
}

impl MessageKind {
    /// Map the provider's `type` field; anything unsupported becomes `Unknown`
    pub fn from_wire(value: &str) -> Self {
        match value {
            "text" => Self::Text,
            "audio" => Self::Audio,
            "image" => Self::Image,
            "interactive" => Self::Interactive,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Interactive => "interactive",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Button the customer tapped in an interactive message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonReply {
    pub id: String,
    pub title: String,
}

/// Structured part of an interactive reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractiveData {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_reply: Option<ButtonReply>,
}

/// One inbound customer message, attributed to a merchant, ready for the
/// processing queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingJob {
    /// Provider message id (`wamid.…`)
    pub message_id: String,
    /// Customer phone number
    pub from: String,
    /// Business display phone number
    pub to: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactive_data: Option<InteractiveData>,
    /// Provider timestamp, seconds since the epoch as sent by the provider
    pub timestamp: String,
    pub received_at: DateTime<Utc>,
    pub business_phone: String,
    pub merchant_id: MerchantId,
}

impl ProcessingJob {
    /// Serialize to the queue wire format
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// A reply produced downstream that must be relayed to a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingJob {
    pub to: String,
    #[serde(default)]
    pub merchant_id: String,
    pub text: String,
    /// Id of the inbound message this reply answers
    #[serde(default)]
    pub message_id: String,
}

impl OutgoingJob {
    /// Decode from the queue wire format
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
