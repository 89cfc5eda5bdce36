//! Background processing of an accepted webhook delivery.

use super::{normalize, WebhookPayload};
use crate::job_publisher::JobPublisher;
use crate::monitoring::MetricsCollector;
use crate::status_tracker::StatusTracker;
use crate::tenant::{MerchantResolver, ResolveError};
use crate::{MerchantId, PhoneNumber};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Counts describing what happened to one delivery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Jobs handed to the processing queue
    pub published: usize,
    /// Message units skipped because no merchant could be resolved
    pub dropped: usize,
    /// Jobs whose publish failed
    pub publish_failed: usize,
    /// Status notifications written to the tracker
    pub statuses_recorded: usize,
}

/// Turns an accepted delivery into status records and processing jobs.
///
/// Failures never propagate: each unit succeeds or fails on its own and the
/// outcome is only visible in logs, metrics and the returned report.
pub struct WebhookPipeline {
    resolver: Arc<dyn MerchantResolver>,
    publisher: Arc<dyn JobPublisher>,
    status_tracker: Arc<dyn StatusTracker>,
    metrics: Arc<dyn MetricsCollector>,
}

impl WebhookPipeline {
    pub fn new(
        resolver: Arc<dyn MerchantResolver>,
        publisher: Arc<dyn JobPublisher>,
        status_tracker: Arc<dyn StatusTracker>,
        metrics: Arc<dyn MetricsCollector>,
    ) -> Self {
        Self {
            resolver,
            publisher,
            status_tracker,
            metrics,
        }
    }

    /// Process one delivery. `started` marks when the HTTP request arrived.
    #[instrument(skip(self, payload, started), fields(entries = payload.entry.len()))]
    pub async fn process_delivery(&self, payload: WebhookPayload, started: Instant) -> DeliveryReport {
        let delivery = normalize(&payload);
        let mut report = DeliveryReport::default();

        for status in &delivery.statuses {
            if self
                .status_tracker
                .record(&status.message_id, &status.status)
                .await
            {
                report.statuses_recorded += 1;
            }
        }

        let mut merchants: HashMap<String, Result<MerchantId, ResolveError>> = HashMap::new();

        for unit in delivery.units {
            let merchant = match merchants.get(&unit.business_phone) {
                Some(resolved) => resolved.clone(),
                None => {
                    let resolved = self.resolve(&unit.business_phone).await;
                    merchants.insert(unit.business_phone.clone(), resolved.clone());
                    resolved
                }
            };

            let merchant_id = match merchant {
                Ok(id) => id,
                Err(e) => {
                    debug!(
                        message_id = %unit.message.id,
                        business_phone = %unit.business_phone,
                        error = %e,
                        "Dropping message without merchant"
                    );
                    report.dropped += 1;
                    continue;
                }
            };

            let job = unit.into_job(merchant_id, Utc::now());
            match self.publisher.publish(&job).await {
                Ok(_) => report.published += 1,
                Err(e) => {
                    warn!(message_id = %job.message_id, error = %e, "Processing job was not published");
                    report.publish_failed += 1;
                }
            }
            self.metrics
                .record_message_processed(job.kind.as_str(), started.elapsed());
        }

        info!(
            published = report.published,
            dropped = report.dropped,
            publish_failed = report.publish_failed,
            statuses_recorded = report.statuses_recorded,
            "Processed webhook delivery"
        );
        report
    }

    async fn resolve(&self, business_phone: &str) -> Result<MerchantId, ResolveError> {
        let phone = PhoneNumber::new(business_phone).map_err(|e| {
            warn!(business_phone = %business_phone, error = %e, "Invalid business phone number");
            ResolveError::TenantNotFound {
                business_phone: business_phone.to_string(),
            }
        })?;

        let resolved = self.resolver.resolve(&phone).await;
        if let Err(e) = &resolved {
            warn!(business_phone = %business_phone, error = %e, "Could not resolve merchant");
            if e.is_transient() {
                self.metrics.record_error("tenant", true);
            }
        }
        resolved
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
