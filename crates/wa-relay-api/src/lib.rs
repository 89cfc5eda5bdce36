//! # wa-relay HTTP Service
//!
//! HTTP surface of the WhatsApp webhook relay.
//!
//! This service provides:
//! - the webhook subscription handshake (`GET /webhook`)
//! - webhook intake with immediate acknowledgement (`POST /webhook`)
//! - a direct send endpoint (`POST /send`)
//! - health and Prometheus metrics endpoints
//!
//! Accepted webhook deliveries are processed in the background by the
//! [`WebhookPipeline`]; the provider only ever waits for parsing.

pub mod background;
pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod responses;


pub use background::BackgroundTasks;
pub use config::{ServiceConfig, LEGACY_ENV_OVERRIDES};
pub use errors::{ApiError, ConfigError, ServiceError};
pub use health::{DependencyHealthChecker, HealthCheckResult, HealthChecker, HealthStatus};
pub use metrics::ServiceMetrics;

use axum::{
    extract::{DefaultBodyLimit, Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use responses::{HealthResponse, StatusResponse, VerifyParams, SERVICE_NAME};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, instrument, warn, Instrument};
use wa_relay_core::monitoring::WebhookOutcome;
use wa_relay_core::send_gateway::OutboundMessage;
use wa_relay_core::webhook::signature::SIGNATURE_HEADER;
use wa_relay_core::webhook::HubSignatureValidator;
use wa_relay_core::{MetricsCollector, SendGateway, WebhookPayload, WebhookPipeline};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: Arc<ServiceConfig>,

    /// Background processing of accepted deliveries
    pub pipeline: Arc<WebhookPipeline>,

    /// Provider send API used by `/send`
    pub gateway: Arc<dyn SendGateway>,

    /// Health checker for system monitoring
    pub health_checker: Arc<dyn HealthChecker>,

    /// Metrics collector for observability
    pub metrics: Arc<ServiceMetrics>,

    /// Tracked tasks spawned for accepted deliveries
    pub background: BackgroundTasks,

    /// Present only when an app secret is configured
    pub signature_validator: Option<HubSignatureValidator>,
}

impl AppState {
    pub fn new(
        config: ServiceConfig,
        pipeline: Arc<WebhookPipeline>,
        gateway: Arc<dyn SendGateway>,
        health_checker: Arc<dyn HealthChecker>,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        let signature_validator = config
            .whatsapp
            .app_secret()
            .cloned()
            .map(HubSignatureValidator::new);
        if signature_validator.is_none() {
            warn!("No app secret configured; webhook signatures will not be checked");
        }

        let background = BackgroundTasks::new(config.processing.max_concurrent_deliveries);

        Self {
            config: Arc::new(config),
            pipeline,
            gateway,
            health_checker,
            metrics,
            background,
            signature_validator,
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let webhook_routes = Router::new()
        .route("/webhook", get(handle_verify).post(handle_webhook))
        .route("/send", post(handle_send));

    let observability_routes = Router::new()
        .route("/health", get(handle_health_check))
        .route("/metrics", get(metrics_endpoint));

    let router = Router::new()
        .merge(webhook_routes)
        .merge(observability_routes)
        .layer(DefaultBodyLimit::max(state.config.server.max_body_size));

    let router = if state.config.server.enable_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    };

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(middleware::from_fn(request_logging_middleware))
                .into_inner(),
        )
        .with_state(state)
}

/// Serve on `listener` until `shutdown` resolves, then drain background work.
///
/// The server stops accepting connections when `shutdown` completes and lets
/// in-flight requests finish. Deliveries still being processed get
/// `server.shutdown_timeout_seconds` to complete before they are cancelled.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), ServiceError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let background = state.background.clone();
    let drain_timeout = Duration::from_secs(state.config.server.shutdown_timeout_seconds);
    let app = create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?;

    if !background.shutdown(drain_timeout).await {
        warn!(
            timeout_seconds = drain_timeout.as_secs(),
            "Some webhook deliveries were cancelled during shutdown"
        );
    }

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Bind the configured address and serve until SIGINT or SIGTERM
pub async fn start_server(state: AppState) -> Result<(), ServiceError> {
    let address = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;

    info!(address = %address, "Starting HTTP server");

    serve(listener, state, shutdown_signal()).await
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

// ============================================================================
// Webhook Handlers
// ============================================================================

/// Subscription handshake: echo the challenge when mode and token match
#[instrument(skip(state, params))]
async fn handle_verify(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Result<String, ApiError> {
    let expected = state.config.whatsapp.verify_token.expose_secret();

    match (params.mode.as_deref(), params.verify_token.as_deref()) {
        (Some("subscribe"), Some(token)) if token == expected => {
            info!("Webhook verification succeeded");
            Ok(params.challenge.unwrap_or_default())
        }
        _ => Err(ApiError::VerificationFailed),
    }
}

/// Accept a webhook delivery.
///
/// Only signature checking and JSON parsing happen before the response;
/// tenant resolution, status tracking and publishing run in the background.
#[instrument(skip(state, headers, body), fields(body_len = body.len()))]
async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError> {
    let started = Instant::now();

    if let Some(validator) = &state.signature_validator {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        if let Err(e) = validator.validate(&body, signature) {
            state.metrics.record_webhook_request(WebhookOutcome::Unauthorized);
            return Err(ApiError::Unauthorized(e));
        }
    }

    let payload = match WebhookPayload::parse(&body) {
        Ok(payload) => payload,
        Err(e) => {
            state.metrics.record_webhook_request(WebhookOutcome::Invalid);
            return Err(ApiError::InvalidPayload(e));
        }
    };

    state.metrics.record_webhook_request(WebhookOutcome::Accepted);
    info!(entries = payload.entry.len(), "Webhook accepted");

    let pipeline = state.pipeline.clone();
    state.background.spawn(
        "webhook_delivery",
        async move {
            let report = pipeline.process_delivery(payload, started).await;
            debug!(
                published = report.published,
                dropped = report.dropped,
                publish_failed = report.publish_failed,
                statuses_recorded = report.statuses_recorded,
                "Webhook delivery processed"
            );
        }
        .in_current_span(),
    );

    Ok(Json(StatusResponse::received()))
}

/// Send one message through the provider API
#[instrument(skip(state, body))]
async fn handle_send(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<StatusResponse>, ApiError> {
    let message: OutboundMessage =
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidMessageFormat {
            message: e.to_string(),
        })?;

    if message.to.trim().is_empty() {
        return Err(ApiError::InvalidMessageFormat {
            message: "recipient is empty".to_string(),
        });
    }

    let receipt = state.gateway.send(&message).await?;
    info!(
        message_type = %message.kind,
        provider_message_id = receipt.message_id.as_deref().unwrap_or(""),
        "Message sent"
    );

    Ok(Json(StatusResponse::sent()))
}

// ============================================================================
// Health and Metrics Handlers
// ============================================================================

#[instrument(skip(state))]
async fn handle_health_check(State(state): State<AppState>) -> Response {
    let status = state.health_checker.check_health().await;
    let error = status.first_failure();

    let (code, label) = if status.is_healthy {
        (StatusCode::OK, "healthy")
    } else {
        warn!(failure = error.as_deref().unwrap_or(""), "Health check failed");
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    let response = HealthResponse {
        status: label.to_string(),
        service: SERVICE_NAME.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        checks: status.checks,
        error,
    };

    (code, Json(response)).into_response()
}

/// Prometheus metrics endpoint
#[instrument(skip_all)]
async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, StatusCode> {
    state.metrics.render().map_err(|e| {
        error!(error = %e, "Failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware
///
/// - Logs request start and completion with structured fields
/// - Propagates correlation ID through response headers
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    // Extract or generate correlation ID
    let correlation_id = request
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());
    request.extensions_mut().insert(correlation_id.clone());

    debug!(method = %method, uri = %uri, "Request started");

    let mut response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert("x-correlation-id", header_value);
    }

    let status = response.status();

    if status.is_server_error() {
        error!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms,
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms,
            "Request completed with client error"
        );
    } else {
        info!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms,
            "Request completed successfully"
        );
    }

    response
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
