//! Relaying downstream replies to customers.
//!
//! Workers place [`OutgoingJob`]s on the outgoing queue. The
//! [`OutgoingConsumer`] takes one message at a time, sends it through the
//! [`SendGateway`] and settles it:
//!
//! | Result                          | Settlement                     |
//! |---------------------------------|--------------------------------|
//! | body is not a valid job         | reject without requeue         |
//! | gateway send failed             | reject with requeue            |
//! | gateway send succeeded          | acknowledge                    |
//!
//! Requeued messages are redelivered without limit or delay. Poison
//! messages that keep failing at the gateway cycle until the gateway
//! accepts them or an operator removes them.

use crate::jobs::OutgoingJob;
use crate::monitoring::MetricsCollector;
use crate::send_gateway::{OutboundMessage, SendGateway};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wa_relay_queue::{QueueClient, QueueError, QueueName, ReceivedMessage};

/// How a single outgoing delivery should be settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Sent; remove from the queue
    Ack,
    /// Undecodable; remove from the queue without sending
    DiscardNack { reason: String },
    /// Send failed; return to the queue for another attempt
    RequeueNack { reason: String },
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::DiscardNack { .. } => "discard",
            Self::RequeueNack { .. } => "requeue",
        }
    }
}

/// Decides the outcome of one outgoing delivery
pub struct OutgoingDeliveryHandler {
    gateway: Arc<dyn SendGateway>,
}

impl OutgoingDeliveryHandler {
    pub fn new(gateway: Arc<dyn SendGateway>) -> Self {
        Self { gateway }
    }

    /// Decode `body` as an [`OutgoingJob`] and send it as a text message.
    pub async fn handle(&self, body: &[u8]) -> DeliveryOutcome {
        let job = match OutgoingJob::from_json(body) {
            Ok(job) if !job.to.trim().is_empty() => job,
            Ok(_) => {
                return DeliveryOutcome::DiscardNack {
                    reason: "outgoing job has no recipient".to_string(),
                }
            }
            Err(e) => {
                return DeliveryOutcome::DiscardNack {
                    reason: format!("invalid outgoing job: {}", e),
                }
            }
        };

        let message = OutboundMessage::text(job.to.clone(), job.text);
        match self.gateway.send(&message).await {
            Ok(receipt) => {
                info!(
                    to = %job.to,
                    merchant_id = %job.merchant_id,
                    reply_to = %job.message_id,
                    provider_message_id = ?receipt.message_id,
                    "Sent outgoing message"
                );
                DeliveryOutcome::Ack
            }
            Err(e) => DeliveryOutcome::RequeueNack {
                reason: e.to_string(),
            },
        }
    }
}

/// Long-running consumer of the outgoing queue
pub struct OutgoingConsumer {
    client: Arc<dyn QueueClient>,
    queue: QueueName,
    handler: OutgoingDeliveryHandler,
    metrics: Arc<dyn MetricsCollector>,
    receive_timeout: chrono::Duration,
    error_backoff: Duration,
}

impl OutgoingConsumer {
    pub fn new(
        client: Arc<dyn QueueClient>,
        queue: QueueName,
        handler: OutgoingDeliveryHandler,
        metrics: Arc<dyn MetricsCollector>,
    ) -> Self {
        Self {
            client,
            queue,
            handler,
            metrics,
            receive_timeout: chrono::Duration::seconds(5),
            error_backoff: Duration::from_secs(1),
        }
    }

    /// How long one receive call waits for a message
    pub fn with_receive_timeout(mut self, timeout: chrono::Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Pause after a failed receive
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Receive, handle and settle at most one message.
    ///
    /// Returns `Ok(None)` when no message arrived within the receive timeout.
    pub async fn process_next(&self) -> Result<Option<DeliveryOutcome>, QueueError> {
        match self
            .client
            .receive_message(&self.queue, self.receive_timeout)
            .await?
        {
            Some(received) => self.process(received).await.map(Some),
            None => Ok(None),
        }
    }

    /// Consume until `cancel` fires.
    ///
    /// Cancellation is observed only while waiting for a message; a message
    /// already received is always handled and settled.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(queue = %self.queue, "Starting outgoing consumer");

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Received shutdown signal, stopping outgoing consumer");
                    break;
                }
                result = self.client.receive_message(&self.queue, self.receive_timeout) => result,
            };

            match received {
                Ok(Some(message)) => {
                    if let Err(e) = self.process(message).await {
                        error!(error = %e, "Failed to settle outgoing message");
                        self.metrics.record_error("queue", e.is_transient());
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "Error receiving outgoing message");
                    self.metrics.record_error("queue", e.is_transient());
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.error_backoff) => {}
                    }
                }
            }
        }

        info!("Outgoing consumer stopped gracefully");
    }

    async fn process(&self, received: ReceivedMessage) -> Result<DeliveryOutcome, QueueError> {
        debug!(
            queue_message_id = %received.message_id,
            delivery_count = received.delivery_count,
            "Handling outgoing message"
        );

        let outcome = self.handler.handle(&received.body).await;
        let receipt = received.receipt_handle;

        match &outcome {
            DeliveryOutcome::Ack => self.client.complete_message(receipt).await?,
            DeliveryOutcome::DiscardNack { reason } => {
                warn!(
                    queue_message_id = %received.message_id,
                    reason = %reason,
                    "Discarding undeliverable outgoing message"
                );
                self.client
                    .dead_letter_message(receipt, reason.clone())
                    .await?
            }
            DeliveryOutcome::RequeueNack { reason } => {
                warn!(
                    queue_message_id = %received.message_id,
                    reason = %reason,
                    "Send failed; requeueing outgoing message"
                );
                self.client.abandon_message(receipt).await?
            }
        }

        self.metrics.record_outgoing_delivery(outcome.as_str());
        Ok(outcome)
    }
}

#[cfg(test)]
#[path = "outgoing_tests.rs"]
mod tests;
