//! Client for the provider's send-message API.
//!
//! Messages are POSTed to `{api_base_url}/{api_version}/{phone_number_id}/messages`
//! with bearer authentication. The request body is the [`OutboundMessage`]
//! wrapped in an envelope that adds `"messaging_product": "whatsapp"`.

use crate::jobs::ButtonReply;
use crate::SecretValue;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

pub const DEFAULT_API_BASE_URL: &str = "https://graph.facebook.com";
pub const DEFAULT_API_VERSION: &str = "v18.0";
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Message model
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBody {
    pub body: String,
}

/// Body line of an interactive message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractiveText {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyButton {
    #[serde(rename = "type")]
    pub kind: String,
    pub reply: ButtonReply,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractiveAction {
    #[serde(default)]
    pub buttons: Vec<ReplyButton>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractiveBody {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<InteractiveText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<InteractiveAction>,
}

/// A message addressed to one customer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactive: Option<InteractiveBody>,
}

impl OutboundMessage {
    /// Plain text message
    pub fn text(to: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            kind: "text".to_string(),
            text: Some(TextBody { body: body.into() }),
            interactive: None,
        }
    }
}

#[derive(Serialize)]
struct SendEnvelope<'a> {
    messaging_product: &'static str,
    #[serde(flatten)]
    message: &'a OutboundMessage,
}

/// Provider acknowledgement of an accepted message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SendReceipt {
    /// Provider id of the created message, when the response carried one
    pub message_id: Option<String>,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SendResponseMessage>,
}

#[derive(Deserialize)]
struct SendResponseMessage {
    id: String,
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while sending a message
#[derive(Debug, Error)]
pub enum SendError {
    #[error("Send gateway is not configured: {message}")]
    Auth { message: String },

    #[error("Provider rejected message with status {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("Send request failed: {message}")]
    Transport { message: String },
}

impl SendError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Auth { .. } => false,
            Self::Remote { status, .. } => *status == 429 || *status >= 500,
            Self::Transport { .. } => true,
        }
    }
}

impl From<reqwest::Error> for SendError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport {
            message: e.to_string(),
        }
    }
}

// ============================================================================
// Gateway
// ============================================================================

/// Sends messages to customers through the provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SendGateway: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, SendError>;
}

/// Connection settings for [`WhatsAppSendGateway`]
#[derive(Debug, Clone)]
pub struct SendGatewayConfig {
    pub api_base_url: String,
    pub api_version: String,
    pub phone_number_id: Option<String>,
    pub access_token: Option<SecretValue>,
    pub timeout: Duration,
}

impl Default for SendGatewayConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            phone_number_id: None,
            access_token: None,
            timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

/// [`SendGateway`] for the WhatsApp Cloud API
#[derive(Debug, Clone)]
pub struct WhatsAppSendGateway {
    http_client: reqwest::Client,
    config: SendGatewayConfig,
}

impl WhatsAppSendGateway {
    pub fn new(config: SendGatewayConfig) -> Result<Self, SendError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SendError::Transport {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            config,
        })
    }

    /// Whether both the phone number id and the access token are set
    pub fn is_configured(&self) -> bool {
        self.phone_number_id().is_some() && self.access_token().is_some()
    }

    fn phone_number_id(&self) -> Option<&str> {
        self.config
            .phone_number_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    fn access_token(&self) -> Option<&SecretValue> {
        self.config.access_token.as_ref().filter(|t| !t.is_empty())
    }

    fn messages_url(&self, phone_number_id: &str) -> String {
        format!(
            "{}/{}/{}/messages",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.api_version,
            phone_number_id
        )
    }
}

#[async_trait]
impl SendGateway for WhatsAppSendGateway {
    #[instrument(skip(self, message), fields(to = %message.to, message_type = %message.kind))]
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, SendError> {
        let phone_number_id = self.phone_number_id().ok_or_else(|| SendError::Auth {
            message: "phone number id is not set".to_string(),
        })?;
        let access_token = self.access_token().ok_or_else(|| SendError::Auth {
            message: "access token is not set".to_string(),
        })?;

        let envelope = SendEnvelope {
            messaging_product: "whatsapp",
            message,
        };

        let response = self
            .http_client
            .post(self.messages_url(phone_number_id))
            .bearer_auth(access_token.expose_secret())
            .json(&envelope)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!(status = status.as_u16(), body = %body, "Provider rejected message");
            return Err(SendError::Remote {
                status: status.as_u16(),
                body,
            });
        }

        let message_id = match response.json::<SendResponse>().await {
            Ok(parsed) => parsed.messages.into_iter().next().map(|m| m.id),
            Err(e) => {
                debug!(error = %e, "Send response carried no message id");
                None
            }
        };

        debug!(provider_message_id = ?message_id, "Message accepted by provider");
        Ok(SendReceipt { message_id })
    }
}

#[cfg(test)]
#[path = "send_gateway_tests.rs"]
mod tests;
