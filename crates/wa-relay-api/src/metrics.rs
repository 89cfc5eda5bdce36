//! Prometheus metrics for the relay.
//!
//! Metrics live in a registry owned by [`ServiceMetrics`] rather than the
//! process-wide default, so each service instance (and each test) gets an
//! independent set of counters.

use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry, HistogramVec,
    IntCounterVec, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;
use wa_relay_core::monitoring::{MetricsCollector, TenantLookupOutcome, WebhookOutcome};

/// Service metrics for observability
#[derive(Debug)]
pub struct ServiceMetrics {
    registry: Registry,

    // Inbound
    pub webhook_requests_total: IntCounterVec,
    pub message_processing_duration: HistogramVec,
    pub jobs_published_total: IntCounterVec,
    pub tenant_lookups_total: IntCounterVec,
    pub status_updates_total: IntCounterVec,

    // Outbound
    pub outgoing_deliveries_total: IntCounterVec,

    // Errors
    pub errors_total: IntCounterVec,
}

impl ServiceMetrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Arc::new(Self {
            webhook_requests_total: register_int_counter_vec_with_registry!(
                "whatsapp_webhook_requests_total",
                "Webhook deliveries received, by outcome",
                &["status"],
                registry
            )?,
            message_processing_duration: register_histogram_vec_with_registry!(
                "message_processing_duration_seconds",
                "Time from delivery receipt to job publication",
                &["message_type"],
                vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0],
                registry
            )?,
            jobs_published_total: register_int_counter_vec_with_registry!(
                "jobs_published_total",
                "Processing jobs handed to the queue, by result",
                &["result"],
                registry
            )?,
            tenant_lookups_total: register_int_counter_vec_with_registry!(
                "tenant_lookups_total",
                "Merchant lookups, by outcome",
                &["outcome"],
                registry
            )?,
            status_updates_total: register_int_counter_vec_with_registry!(
                "status_updates_total",
                "Delivery status notifications, by result",
                &["result"],
                registry
            )?,
            outgoing_deliveries_total: register_int_counter_vec_with_registry!(
                "outgoing_deliveries_total",
                "Outgoing replies settled, by outcome",
                &["outcome"],
                registry
            )?,
            errors_total: register_int_counter_vec_with_registry!(
                "errors_total",
                "Errors grouped by category and transience",
                &["category", "transient"],
                registry
            )?,
            registry,
        }))
    }

    /// Render every metric in the Prometheus text exposition format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

impl MetricsCollector for ServiceMetrics {
    fn record_webhook_request(&self, outcome: WebhookOutcome) {
        self.webhook_requests_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    fn record_message_processed(&self, message_type: &str, duration: Duration) {
        self.message_processing_duration
            .with_label_values(&[message_type])
            .observe(duration.as_secs_f64());
    }

    fn record_job_published(&self, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.jobs_published_total.with_label_values(&[result]).inc();
    }

    fn record_tenant_lookup(&self, outcome: TenantLookupOutcome) {
        self.tenant_lookups_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    fn record_status_update(&self, stored: bool) {
        let result = if stored { "stored" } else { "failed" };
        self.status_updates_total.with_label_values(&[result]).inc();
    }

    fn record_outgoing_delivery(&self, outcome: &str) {
        self.outgoing_deliveries_total
            .with_label_values(&[outcome])
            .inc();
    }

    fn record_error(&self, category: &str, is_transient: bool) {
        let transient = if is_transient { "true" } else { "false" };
        self.errors_total
            .with_label_values(&[category, transient])
            .inc();
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
