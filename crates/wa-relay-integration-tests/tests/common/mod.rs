//! Common test utilities for wa-relay integration tests
//!
//! [`TestRelay`] wires the real HTTP stack and pipeline over in-memory
//! adapters:
//! - merchants live in an `InMemoryMerchantStore`
//! - an `InMemoryCache` stands in for Redis
//! - the queue is an `InMemoryProvider` whose contents tests can inspect
//! - the send API is a wiremock server behind the real `WhatsAppSendGateway`

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use bytes::Bytes;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wa_relay_api::{create_router, AppState, DependencyHealthChecker, ServiceConfig, ServiceMetrics};
use wa_relay_core::adapters::{InMemoryMerchantStore, MerchantRecord};
use wa_relay_core::cache::InMemoryCache;
use wa_relay_core::monitoring::RecordingMetricsCollector;
use wa_relay_core::{
    CacheAsideMerchantResolver, CacheStatusTracker, MetricsCollector, OutgoingConsumer,
    OutgoingDeliveryHandler, ProcessingJob, QueueJobPublisher, SecretValue, WebhookPipeline,
    WhatsAppSendGateway,
};
use wa_relay_queue::{
    InMemoryProvider, Message, QueueClient, QueueConfig, QueueName, StandardQueueClient,
};
use wiremock::MockServer;

pub const VERIFY_TOKEN: &str = "integration-verify-token";
pub const ACCESS_TOKEN: &str = "integration-access-token";
pub const PHONE_NUMBER_ID: &str = "109876543210";
pub const BUSINESS_PHONE: &str = "15550001111";
pub const MERCHANT_ID: &str = "7d5e4a1c-2b3f-4e6a-9c8d-1f2e3d4c5b6a";
pub const CUSTOMER_PHONE: &str = "15552223333";
pub const PROCESSING_QUEUE: &str = "message_processing";
pub const OUTGOING_QUEUE: &str = "outgoing_messages";

// ============================================================================
// Test relay
// ============================================================================

/// The relay wired over in-memory dependencies
pub struct TestRelay {
    pub state: AppState,
    pub store: Arc<InMemoryMerchantStore>,
    pub cache: Arc<InMemoryCache>,
    pub provider: InMemoryProvider,
    pub queue: Arc<dyn QueueClient>,
    pub recorder: Arc<RecordingMetricsCollector>,
    pub provider_api: MockServer,
}

impl TestRelay {
    pub async fn start() -> Self {
        Self::with_config(test_config()).await
    }

    /// Build the relay; send API settings in `config` are replaced so the
    /// gateway talks to the wiremock server.
    pub async fn with_config(mut config: ServiceConfig) -> Self {
        let provider_api = MockServer::start().await;
        config.whatsapp.api_base_url = provider_api.uri();
        config.whatsapp.phone_number_id = Some(PHONE_NUMBER_ID.to_string());
        config.whatsapp.access_token = Some(SecretValue::from_string(ACCESS_TOKEN.to_string()));

        let store = Arc::new(InMemoryMerchantStore::new());
        store.insert(MerchantRecord::active(MERCHANT_ID, BUSINESS_PHONE));

        let cache = Arc::new(InMemoryCache::new());
        let provider = InMemoryProvider::default();
        let queue: Arc<dyn QueueClient> = Arc::new(StandardQueueClient::new(
            Box::new(provider.clone()),
            QueueConfig::default(),
        ));

        let recorder = Arc::new(RecordingMetricsCollector::new());
        let collector: Arc<dyn MetricsCollector> = recorder.clone();

        let pipeline = WebhookPipeline::new(
            Arc::new(CacheAsideMerchantResolver::new(
                cache.clone(),
                store.clone(),
                collector.clone(),
            )),
            Arc::new(QueueJobPublisher::new(
                queue.clone(),
                processing_queue(),
                collector.clone(),
            )),
            Arc::new(CacheStatusTracker::new(cache.clone(), collector.clone())),
            collector,
        );

        let gateway = Arc::new(
            WhatsAppSendGateway::new(config.whatsapp.send_gateway_config())
                .expect("gateway should build"),
        );
        let health_checker = Arc::new(DependencyHealthChecker::new(
            cache.clone(),
            queue.clone(),
            store.clone(),
        ));

        let state = AppState::new(
            config,
            Arc::new(pipeline),
            gateway,
            health_checker,
            ServiceMetrics::new().expect("metrics should register"),
        );

        Self {
            state,
            store,
            cache,
            provider,
            queue,
            recorder,
            provider_api,
        }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Wait for every accepted delivery to finish processing
    pub async fn drain(&self) {
        assert!(
            self.state.background.shutdown(Duration::from_secs(5)).await,
            "background processing did not finish"
        );
    }

    /// Jobs currently waiting on the processing queue, oldest first
    pub fn processing_jobs(&self) -> Vec<ProcessingJob> {
        self.provider
            .peek_bodies(&processing_queue())
            .iter()
            .map(|body| serde_json::from_slice(body).expect("job should decode"))
            .collect()
    }

    /// Put raw bytes on the outgoing queue
    pub async fn enqueue_outgoing(&self, body: impl Into<Bytes>) {
        self.queue
            .send_message(&outgoing_queue(), Message::new(body.into()).persistent())
            .await
            .expect("enqueue should succeed");
    }

    /// Consumer over the outgoing queue using the relay's gateway
    pub fn outgoing_consumer(&self) -> OutgoingConsumer {
        OutgoingConsumer::new(
            self.queue.clone(),
            outgoing_queue(),
            OutgoingDeliveryHandler::new(self.state.gateway.clone()),
            self.recorder.clone(),
        )
        .with_receive_timeout(chrono::Duration::milliseconds(50))
    }
}

pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.whatsapp.verify_token = SecretValue::from_string(VERIFY_TOKEN.to_string());
    config.queue.url = "memory://".to_string();
    config
}

pub fn processing_queue() -> QueueName {
    QueueName::new(PROCESSING_QUEUE.to_string()).expect("valid queue name")
}

pub fn outgoing_queue() -> QueueName {
    QueueName::new(OUTGOING_QUEUE.to_string()).expect("valid queue name")
}

// ============================================================================
// HTTP helpers
// ============================================================================

pub async fn post(router: Router, uri: &str, body: impl Into<Body>) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap();
    router.oneshot(request).await.unwrap()
}

pub async fn get(router: Router, uri: &str) -> Response<Body> {
    router
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ============================================================================
// Payload builders
// ============================================================================

/// Delivery envelope around one `messages` change
pub fn delivery(business_phone: &str, messages: Vec<Value>, statuses: Vec<Value>) -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "WABA_ID",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {
                        "display_phone_number": business_phone,
                        "phone_number_id": PHONE_NUMBER_ID
                    },
                    "contacts": [{"profile": {"name": "Customer"}, "wa_id": CUSTOMER_PHONE}],
                    "messages": messages,
                    "statuses": statuses
                }
            }]
        }]
    })
}

pub fn text_message(id: &str, body: &str) -> Value {
    json!({
        "from": CUSTOMER_PHONE,
        "id": id,
        "timestamp": "1700000000",
        "type": "text",
        "text": {"body": body}
    })
}

pub fn button_reply_message(id: &str, reply_id: &str, title: &str) -> Value {
    json!({
        "from": CUSTOMER_PHONE,
        "id": id,
        "timestamp": "1700000000",
        "type": "interactive",
        "interactive": {
            "type": "button_reply",
            "button_reply": {"id": reply_id, "title": title}
        }
    })
}

pub fn status(id: &str, status: &str) -> Value {
    json!({
        "id": id,
        "status": status,
        "timestamp": "1700000001",
        "recipient_id": CUSTOMER_PHONE
    })
}
