//! Publishing processing jobs to the processing queue.

use crate::jobs::ProcessingJob;
use crate::monitoring::MetricsCollector;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, instrument};
use wa_relay_queue::{Message, MessageId, QueueClient, QueueError, QueueName};

/// Errors raised while publishing a job
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to serialize job: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queue publish failed: {0}")]
    Queue(#[from] QueueError),
}

impl PublishError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Serialization(_) => false,
            Self::Queue(e) => e.is_transient(),
        }
    }
}

/// Hands processing jobs to downstream workers
#[async_trait]
pub trait JobPublisher: Send + Sync {
    async fn publish(&self, job: &ProcessingJob) -> Result<MessageId, PublishError>;
}

/// [`JobPublisher`] writing persistent JSON messages to a named queue.
///
/// Publishing is fire-and-forget: the call returns once the broker client
/// has accepted the message, without waiting for a broker confirm.
pub struct QueueJobPublisher {
    client: Arc<dyn QueueClient>,
    queue: QueueName,
    metrics: Arc<dyn MetricsCollector>,
}

impl QueueJobPublisher {
    pub fn new(
        client: Arc<dyn QueueClient>,
        queue: QueueName,
        metrics: Arc<dyn MetricsCollector>,
    ) -> Self {
        Self {
            client,
            queue,
            metrics,
        }
    }

    pub fn queue(&self) -> &QueueName {
        &self.queue
    }
}

#[async_trait]
impl JobPublisher for QueueJobPublisher {
    #[instrument(skip(self, job), fields(message_id = %job.message_id, merchant_id = %job.merchant_id, queue = %self.queue))]
    async fn publish(&self, job: &ProcessingJob) -> Result<MessageId, PublishError> {
        let body = job.to_json()?;
        let message = Message::new(body.into())
            .with_content_type("application/json")
            .with_correlation_id(job.message_id.clone())
            .with_attribute("merchant_id".to_string(), job.merchant_id.to_string())
            .with_attribute("message_type".to_string(), job.kind.to_string())
            .persistent();

        match self.client.send_message(&self.queue, message).await {
            Ok(id) => {
                debug!(queue_message_id = %id, "Published processing job");
                self.metrics.record_job_published(true);
                Ok(id)
            }
            Err(e) => {
                error!(error = %e, "Failed to publish processing job");
                self.metrics.record_job_published(false);
                self.metrics.record_error("queue", e.is_transient());
                Err(PublishError::Queue(e))
            }
        }
    }
}

#[cfg(test)]
#[path = "job_publisher_tests.rs"]
mod tests;
