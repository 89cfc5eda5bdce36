//! Response bodies for the HTTP endpoints

use crate::health::HealthCheckResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Service name reported by the health endpoint
pub const SERVICE_NAME: &str = "whatsapp-webhook-handler";

/// Query string of the subscription handshake
#[derive(Debug, Default, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,

    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,

    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// `{"status": "..."}` acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn received() -> Self {
        Self {
            status: "received".to_string(),
        }
    }

    pub fn sent() -> Self {
        Self {
            status: "sent".to_string(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub timestamp: String,
    pub checks: HashMap<String, HealthCheckResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
