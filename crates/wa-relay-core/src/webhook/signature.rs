//! `X-Hub-Signature-256` verification.
//!
//! When an app secret is configured the provider signs each delivery with
//! HMAC-SHA256 over the raw request body and sends `sha256=<hex>` in the
//! `X-Hub-Signature-256` header.

use super::WebhookError;
use crate::SecretValue;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Validates delivery signatures against the app secret
#[derive(Clone)]
pub struct HubSignatureValidator {
    secret: SecretValue,
}

impl std::fmt::Debug for HubSignatureValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubSignatureValidator")
            .field("secret", &"<REDACTED>")
            .finish()
    }
}

impl HubSignatureValidator {
    pub fn new(secret: SecretValue) -> Self {
        Self { secret }
    }

    /// Verify `signature` (the raw header value) for `payload`.
    pub fn validate(&self, payload: &[u8], signature: Option<&str>) -> Result<(), WebhookError> {
        let signature = signature.ok_or(WebhookError::MissingSignature)?;

        let hex_signature = signature.strip_prefix(SIGNATURE_PREFIX).ok_or_else(|| {
            WebhookError::InvalidSignature {
                message: format!("signature must start with '{}'", SIGNATURE_PREFIX),
            }
        })?;

        let provided = hex::decode(hex_signature).map_err(|e| WebhookError::InvalidSignature {
            message: format!("invalid hex encoding: {}", e),
        })?;

        let expected = self.compute(payload)?;

        if bool::from(expected.ct_eq(&provided)) {
            Ok(())
        } else {
            Err(WebhookError::InvalidSignature {
                message: "signature does not match payload".to_string(),
            })
        }
    }

    /// Compute the `sha256=<hex>` header value for `payload`
    pub fn sign(&self, payload: &[u8]) -> Result<String, WebhookError> {
        Ok(format!("{}{}", SIGNATURE_PREFIX, hex::encode(self.compute(payload)?)))
    }

    fn compute(&self, payload: &[u8]) -> Result<Vec<u8>, WebhookError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes()).map_err(
            |e| WebhookError::InvalidSignature {
                message: format!("failed to create HMAC instance: {}", e),
            },
        )?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;
