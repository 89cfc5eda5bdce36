//! Tests for HTTP error mapping.

use super::*;
use axum::body::to_bytes;

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_invalid_payload_maps_to_400() {
    let error = ApiError::InvalidPayload(WebhookError::InvalidPayload {
        message: "expected value at line 1".to_string(),
    });

    let response = error.into_response();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid payload");
    assert_eq!(body["status"], 400);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_verification_failure_maps_to_403() {
    let response = ApiError::VerificationFailed.into_response();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "Verification failed");
}

#[tokio::test]
async fn test_send_failure_hides_provider_details() {
    let error = ApiError::SendFailed(SendError::Remote {
        status: 401,
        body: "token expired for app 12345".to_string(),
    });

    let response = error.into_response();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Failed to send message");
    assert!(!body.to_string().contains("12345"));
}

#[test]
fn test_signature_failure_maps_to_401() {
    let error = ApiError::Unauthorized(WebhookError::MissingSignature);
    assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);
}

#[test]
fn test_service_error_exit_codes() {
    assert_eq!(
        ServiceError::BindFailed {
            address: "0.0.0.0:8080".to_string(),
            message: "in use".to_string()
        }
        .exit_code(),
        1
    );
    assert_eq!(
        ServiceError::ServerFailed {
            message: String::new()
        }
        .exit_code(),
        2
    );
    assert_eq!(
        ServiceError::Configuration(ConfigError::Missing {
            key: "whatsapp.verify_token".to_string()
        })
        .exit_code(),
        3
    );
    assert_eq!(
        ServiceError::HealthCheckFailed {
            message: String::new()
        }
        .exit_code(),
        4
    );
}
