//! Router tests for the webhook, send, health and metrics endpoints.

use super::*;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use std::collections::HashMap;
use std::sync::Mutex;
use tower::ServiceExt;
use wa_relay_core::adapters::InMemoryMerchantStore;
use wa_relay_core::cache::InMemoryCache;
use wa_relay_core::send_gateway::SendReceipt;
use wa_relay_core::{
    CacheAsideMerchantResolver, CacheStatusTracker, NoOpMetricsCollector, QueueJobPublisher,
    SecretValue, SendError,
};
use wa_relay_queue::{QueueClient, QueueClientFactory, QueueName};

const VERIFY_TOKEN: &str = "verify-me";

// ============================================================================
// Test doubles
// ============================================================================

/// Records every message and optionally fails with a remote error
#[derive(Default)]
struct FakeGateway {
    sent: Mutex<Vec<OutboundMessage>>,
    fail: bool,
}

impl FakeGateway {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SendGateway for FakeGateway {
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, SendError> {
        self.sent.lock().unwrap().push(message.clone());
        if self.fail {
            return Err(SendError::Remote {
                status: 500,
                body: "upstream broke".to_string(),
            });
        }
        Ok(SendReceipt {
            message_id: Some("wamid.sent".to_string()),
        })
    }
}

struct StaticHealthChecker {
    healthy: bool,
}

#[async_trait]
impl HealthChecker for StaticHealthChecker {
    async fn check_health(&self) -> HealthStatus {
        let mut checks = HashMap::new();
        checks.insert(
            "cache".to_string(),
            HealthCheckResult {
                healthy: true,
                message: "ok".to_string(),
                duration_ms: 1,
            },
        );
        checks.insert(
            "store".to_string(),
            HealthCheckResult {
                healthy: self.healthy,
                message: if self.healthy { "ok" } else { "connection refused" }.to_string(),
                duration_ms: 1,
            },
        );
        HealthStatus::from_checks(checks)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.whatsapp.verify_token = SecretValue::from_string(VERIFY_TOKEN.to_string());
    config
}

fn test_state(config: ServiceConfig, gateway: Arc<FakeGateway>, healthy: bool) -> AppState {
    let metrics = ServiceMetrics::new().unwrap();
    let noop: Arc<dyn MetricsCollector> = Arc::new(NoOpMetricsCollector);
    let cache = Arc::new(InMemoryCache::new());
    let queue: Arc<dyn QueueClient> = Arc::from(QueueClientFactory::create_test_client());

    let pipeline = WebhookPipeline::new(
        Arc::new(CacheAsideMerchantResolver::new(
            cache.clone(),
            Arc::new(InMemoryMerchantStore::new()),
            noop.clone(),
        )),
        Arc::new(QueueJobPublisher::new(
            queue,
            QueueName::new("message_processing".to_string()).unwrap(),
            noop.clone(),
        )),
        Arc::new(CacheStatusTracker::new(cache, noop)),
        metrics.clone(),
    );

    AppState::new(
        config,
        Arc::new(pipeline),
        gateway,
        Arc::new(StaticHealthChecker { healthy }),
        metrics,
    )
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

const STATUS_ONLY_PAYLOAD: &str = r#"{
    "object": "whatsapp_business_account",
    "entry": [{
        "id": "1",
        "changes": [{
            "field": "messages",
            "value": {
                "messaging_product": "whatsapp",
                "metadata": {"display_phone_number": "15550001111", "phone_number_id": "111"},
                "statuses": [{"id": "wamid.1", "status": "delivered", "timestamp": "1700000000", "recipient_id": "15552223333"}]
            }
        }]
    }]
}"#;

// ============================================================================
// Verification
// ============================================================================

#[tokio::test]
async fn test_verify_echoes_challenge_for_matching_token() {
    // Arrange
    let app = create_router(test_state(test_config(), Arc::new(FakeGateway::default()), true));
    let uri = format!(
        "/webhook?hub.mode=subscribe&hub.verify_token={}&hub.challenge=1234",
        VERIFY_TOKEN
    );

    // Act
    let response = app
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "1234");
}

#[tokio::test]
async fn test_verify_rejects_wrong_token() {
    // Arrange
    let app = create_router(test_state(test_config(), Arc::new(FakeGateway::default()), true));

    // Act
    let response = app
        .oneshot(
            Request::get("/webhook?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=1234")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "Verification failed");
}

#[tokio::test]
async fn test_verify_rejects_wrong_mode_and_missing_parameters() {
    let app = create_router(test_state(test_config(), Arc::new(FakeGateway::default()), true));

    for uri in [
        format!("/webhook?hub.mode=unsubscribe&hub.verify_token={}&hub.challenge=1", VERIFY_TOKEN),
        "/webhook".to_string(),
    ] {
        let response = app
            .clone()
            .oneshot(Request::get(uri.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "uri {}", uri);
    }
}

// ============================================================================
// Webhook intake
// ============================================================================

#[tokio::test]
async fn test_webhook_acknowledges_valid_payload() {
    // Arrange
    let state = test_state(test_config(), Arc::new(FakeGateway::default()), true);
    let metrics = state.metrics.clone();
    let background = state.background.clone();
    let app = create_router(state);

    // Act
    let response = app
        .oneshot(post_json("/webhook", STATUS_ONLY_PAYLOAD))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "received");
    assert_eq!(
        metrics
            .webhook_requests_total
            .with_label_values(&["success"])
            .get(),
        1
    );
    assert!(background.shutdown(Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_webhook_rejects_malformed_json() {
    // Arrange
    let state = test_state(test_config(), Arc::new(FakeGateway::default()), true);
    let metrics = state.metrics.clone();
    let app = create_router(state);

    // Act
    let response = app.oneshot(post_json("/webhook", "{not json")).await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid payload");
    assert_eq!(body["status"], 400);
    assert_eq!(
        metrics
            .webhook_requests_total
            .with_label_values(&["invalid"])
            .get(),
        1
    );
}

#[tokio::test]
async fn test_webhook_requires_signature_when_app_secret_set() {
    // Arrange
    let mut config = test_config();
    config.whatsapp.app_secret = Some(SecretValue::from_string("app-secret".to_string()));
    let app = create_router(test_state(config, Arc::new(FakeGateway::default()), true));

    // Act
    let response = app
        .oneshot(post_json("/webhook", STATUS_ONLY_PAYLOAD))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Invalid signature");
}

#[tokio::test]
async fn test_webhook_accepts_correct_signature() {
    // Arrange
    let mut config = test_config();
    config.whatsapp.app_secret = Some(SecretValue::from_string("app-secret".to_string()));
    let app = create_router(test_state(config, Arc::new(FakeGateway::default()), true));
    let signer = HubSignatureValidator::new(SecretValue::from_string("app-secret".to_string()));
    let signature = signer.sign(STATUS_ONLY_PAYLOAD.as_bytes()).unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(STATUS_ONLY_PAYLOAD))
        .unwrap();

    // Act
    let response = app.oneshot(request).await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_webhook_rejects_oversized_body() {
    // Arrange
    let mut config = test_config();
    config.server.max_body_size = 64;
    let app = create_router(test_state(config, Arc::new(FakeGateway::default()), true));

    // Act
    let response = app
        .oneshot(post_json("/webhook", STATUS_ONLY_PAYLOAD))
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

// ============================================================================
// Send endpoint
// ============================================================================

#[tokio::test]
async fn test_send_forwards_message_to_gateway() {
    // Arrange
    let gateway = Arc::new(FakeGateway::default());
    let app = create_router(test_state(test_config(), gateway.clone(), true));
    let body = r#"{"to":"15552223333","type":"text","text":{"body":"Your order shipped"}}"#;

    // Act
    let response = app.oneshot(post_json("/send", body)).await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "sent");
    assert_eq!(
        gateway.sent(),
        vec![OutboundMessage::text("15552223333", "Your order shipped")]
    );
}

#[tokio::test]
async fn test_send_rejects_malformed_body() {
    // Arrange
    let gateway = Arc::new(FakeGateway::default());
    let app = create_router(test_state(test_config(), gateway.clone(), true));

    // Act
    let response = app.oneshot(post_json("/send", r#"{"text":1}"#)).await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Invalid message format");
    assert!(gateway.sent().is_empty());
}

#[tokio::test]
async fn test_send_reports_gateway_failure_as_server_error() {
    // Arrange
    let app = create_router(test_state(test_config(), Arc::new(FakeGateway::failing()), true));
    let body = r#"{"to":"15552223333","type":"text","text":{"body":"hi"}}"#;

    // Act
    let response = app.oneshot(post_json("/send", body)).await.unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Failed to send message");
    assert!(!body.to_string().contains("upstream broke"));
}

// ============================================================================
// Health and metrics
// ============================================================================

#[tokio::test]
async fn test_health_reports_healthy_service() {
    let app = create_router(test_state(test_config(), Arc::new(FakeGateway::default()), true));

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], SERVICE_NAME);
    assert_eq!(body["checks"]["store"]["healthy"], true);
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn test_health_reports_failing_dependency() {
    let app = create_router(test_state(test_config(), Arc::new(FakeGateway::default()), false));

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["error"], "store: connection refused");
}

#[tokio::test]
async fn test_metrics_endpoint_renders_service_registry() {
    // Arrange
    let state = test_state(test_config(), Arc::new(FakeGateway::default()), true);
    state.metrics.record_webhook_request(WebhookOutcome::Invalid);
    let app = create_router(state);

    // Act
    let response = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert!(text.contains("whatsapp_webhook_requests_total{status=\"invalid\"} 1"));
}

#[tokio::test]
async fn test_serve_stops_on_shutdown_signal() {
    // Arrange
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let state = test_state(test_config(), Arc::new(FakeGateway::default()), true);

    // Act
    let result = serve(listener, state, async {}).await;

    // Assert
    assert!(result.is_ok());
}
