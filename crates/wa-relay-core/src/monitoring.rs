//! Metrics collection and monitoring.
//!
//! This module defines what the relay measures. The trait is implemented by
//! infrastructure layers (wa-relay-api with Prometheus) and injected into
//! every component that records metrics, so tests can assert on recorded
//! values without any process-wide registry.
//!
//! Recording is best-effort: implementations never fail and never block
//! business operations.
//!
//! # Examples
//!
//! ```rust
//! use wa_relay_core::monitoring::{MetricsCollector, NoOpMetricsCollector, WebhookOutcome};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let metrics: Arc<dyn MetricsCollector> = Arc::new(NoOpMetricsCollector);
//!
//! metrics.record_webhook_request(WebhookOutcome::Accepted);
//! metrics.record_message_processed("text", Duration::from_millis(12));
//! ```

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Result of receiving one webhook delivery over HTTP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Parsed and handed to background processing
    Accepted,
    /// Body was not a valid provider payload
    Invalid,
    /// Signature check failed
    Unauthorized,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "success",
            Self::Invalid => "invalid",
            Self::Unauthorized => "unauthorized",
        }
    }
}

/// Result of one merchant lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantLookupOutcome {
    CacheHit,
    CacheMiss,
    NotFound,
    Error,
}

impl TenantLookupOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CacheHit => "cache_hit",
            Self::CacheMiss => "cache_miss",
            Self::NotFound => "not_found",
            Self::Error => "error",
        }
    }
}

/// Metrics collector for relay operations.
///
/// All methods take `&self` to support `Arc<dyn MetricsCollector>` sharing
/// across async tasks. Implementations must be thread-safe.
pub trait MetricsCollector: Send + Sync {
    /// Record a webhook delivery received over HTTP.
    ///
    /// # Metrics Updated
    ///
    /// - `whatsapp_webhook_requests_total{status}`
    fn record_webhook_request(&self, outcome: WebhookOutcome);

    /// Record one inbound message turned into a job (or dropped).
    ///
    /// `duration` is measured from the moment the delivery was received.
    ///
    /// # Metrics Updated
    ///
    /// - `message_processing_duration_seconds{message_type}`
    fn record_message_processed(&self, message_type: &str, duration: Duration);

    /// Record a processing-queue publish attempt.
    ///
    /// # Metrics Updated
    ///
    /// - `jobs_published_total{result}`
    fn record_job_published(&self, success: bool);

    /// Record a merchant lookup.
    ///
    /// # Metrics Updated
    ///
    /// - `tenant_lookups_total{outcome}`
    fn record_tenant_lookup(&self, outcome: TenantLookupOutcome);

    /// Record a delivery status notification.
    ///
    /// # Metrics Updated
    ///
    /// - `status_updates_total{result}`
    fn record_status_update(&self, stored: bool);

    /// Record how an outgoing reply was settled.
    ///
    /// # Metrics Updated
    ///
    /// - `outgoing_deliveries_total{outcome}` with `ack`, `discard` or `requeue`
    fn record_outgoing_delivery(&self, outcome: &str);

    /// Record an error occurrence.
    ///
    /// # Metrics Updated
    ///
    /// - `errors_total{category, transient}`
    fn record_error(&self, category: &str, is_transient: bool);
}

/// No-op metrics collector.
///
/// Silently ignores all metric recording calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetricsCollector;

impl MetricsCollector for NoOpMetricsCollector {
    fn record_webhook_request(&self, _outcome: WebhookOutcome) {}

    fn record_message_processed(&self, _message_type: &str, _duration: Duration) {}

    fn record_job_published(&self, _success: bool) {}

    fn record_tenant_lookup(&self, _outcome: TenantLookupOutcome) {}

    fn record_status_update(&self, _stored: bool) {}

    fn record_outgoing_delivery(&self, _outcome: &str) {}

    fn record_error(&self, _category: &str, _is_transient: bool) {}
}

/// In-process collector that counts every recorded event.
///
/// Intended for tests and for local runs without a metrics backend.
/// Counters are keyed by metric name and label value.
#[derive(Debug, Default)]
pub struct RecordingMetricsCollector {
    counters: Mutex<HashMap<(String, String), u64>>,
}

impl RecordingMetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter, zero when never incremented
    pub fn count(&self, metric: &str, label: &str) -> u64 {
        self.counters
            .lock()
            .ok()
            .and_then(|c| c.get(&(metric.to_string(), label.to_string())).copied())
            .unwrap_or(0)
    }

    fn increment(&self, metric: &str, label: &str) {
        if let Ok(mut counters) = self.counters.lock() {
            *counters
                .entry((metric.to_string(), label.to_string()))
                .or_insert(0) += 1;
        }
    }
}

impl MetricsCollector for RecordingMetricsCollector {
    fn record_webhook_request(&self, outcome: WebhookOutcome) {
        self.increment("webhook_requests", outcome.as_str());
    }

    fn record_message_processed(&self, message_type: &str, _duration: Duration) {
        self.increment("messages_processed", message_type);
    }

    fn record_job_published(&self, success: bool) {
        self.increment("jobs_published", if success { "success" } else { "failure" });
    }

    fn record_tenant_lookup(&self, outcome: TenantLookupOutcome) {
        self.increment("tenant_lookups", outcome.as_str());
    }

    fn record_status_update(&self, stored: bool) {
        self.increment("status_updates", if stored { "stored" } else { "failed" });
    }

    fn record_outgoing_delivery(&self, outcome: &str) {
        self.increment("outgoing_deliveries", outcome);
    }

    fn record_error(&self, category: &str, _is_transient: bool) {
        self.increment("errors", category);
    }
}

#[cfg(test)]
#[path = "monitoring_tests.rs"]
mod tests;
