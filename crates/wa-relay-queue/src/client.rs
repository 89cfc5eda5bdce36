//! The [`QueueClient`] seam used by the relay, and the provider trait behind it.

use crate::error::QueueError;
use crate::message::{Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage};
use crate::provider::{InMemoryConfig, ProviderConfig, ProviderType, QueueConfig};
use crate::providers::{AmqpProvider, InMemoryProvider};
use async_trait::async_trait;
use chrono::Duration;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Publish, consume and settle messages on a named queue.
///
/// Settlement methods take the receipt by value: a receipt is spent once the
/// message is acked or nacked.
#[async_trait]
pub trait QueueClient: Send + Sync {
    async fn send_message(&self, queue: &QueueName, message: Message)
        -> Result<MessageId, QueueError>;

    /// `Ok(None)` when nothing arrived within `timeout`
    async fn receive_message(
        &self,
        queue: &QueueName,
        timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError>;

    /// Ack
    async fn complete_message(&self, receipt: ReceiptHandle) -> Result<(), QueueError>;

    /// Nack with requeue
    async fn abandon_message(&self, receipt: ReceiptHandle) -> Result<(), QueueError>;

    /// Nack without requeue; the broker drops it or routes it to a dead-letter exchange
    async fn dead_letter_message(
        &self,
        receipt: ReceiptHandle,
        reason: String,
    ) -> Result<(), QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;

    fn provider_type(&self) -> ProviderType;
}

/// Implemented by each broker backend (AMQP, in-memory)
#[async_trait]
pub trait QueueProvider: Send + Sync {
    async fn send_message(&self, queue: &QueueName, message: &Message)
        -> Result<MessageId, QueueError>;

    async fn receive_message(
        &self,
        queue: &QueueName,
        timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError>;

    async fn complete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError>;

    async fn abandon_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError>;

    async fn dead_letter_message(
        &self,
        receipt: &ReceiptHandle,
        reason: &str,
    ) -> Result<(), QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;

    fn provider_type(&self) -> ProviderType;
}

/// Builds a client for whichever provider the configuration names.
pub struct QueueClientFactory;

impl QueueClientFactory {
    /// Connects to the broker when the provider is AMQP
    pub async fn create_client(config: QueueConfig) -> Result<Box<dyn QueueClient>, QueueError> {
        let provider: Box<dyn QueueProvider> = match &config.provider {
            ProviderConfig::InMemory(in_memory_config) => {
                Box::new(InMemoryProvider::new(in_memory_config.clone()))
            }
            ProviderConfig::Amqp(amqp_config) => {
                Box::new(AmqpProvider::connect(amqp_config.clone()).await?)
            }
        };

        Ok(Box::new(StandardQueueClient::new(provider, config)))
    }

    /// In-memory client with default settings
    pub fn create_test_client() -> Box<dyn QueueClient> {
        let provider = InMemoryProvider::new(InMemoryConfig::default());
        Box::new(StandardQueueClient::new(
            Box::new(provider),
            QueueConfig::default(),
        ))
    }
}

/// [`QueueClient`] over a boxed provider, enforcing the provider's size limit
pub struct StandardQueueClient {
    provider: Box<dyn QueueProvider>,
    config: QueueConfig,
}

impl StandardQueueClient {
    pub fn new(provider: Box<dyn QueueProvider>, config: QueueConfig) -> Self {
        Self { provider, config }
    }

    /// Timeout applied to provider calls that do not carry their own
    pub fn default_timeout(&self) -> Duration {
        self.config.default_timeout
    }

    fn check_size(&self, message: &Message) -> Result<(), QueueError> {
        let max_size = self.provider.provider_type().max_message_size();
        if message.body.len() > max_size {
            return Err(QueueError::MessageTooLarge {
                size: message.body.len(),
                max_size,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl QueueClient for StandardQueueClient {
    async fn send_message(
        &self,
        queue: &QueueName,
        message: Message,
    ) -> Result<MessageId, QueueError> {
        self.check_size(&message)?;
        self.provider.send_message(queue, &message).await
    }

    async fn receive_message(
        &self,
        queue: &QueueName,
        timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        self.provider.receive_message(queue, timeout).await
    }

    async fn complete_message(&self, receipt: ReceiptHandle) -> Result<(), QueueError> {
        self.provider.complete_message(&receipt).await
    }

    async fn abandon_message(&self, receipt: ReceiptHandle) -> Result<(), QueueError> {
        self.provider.abandon_message(&receipt).await
    }

    async fn dead_letter_message(
        &self,
        receipt: ReceiptHandle,
        reason: String,
    ) -> Result<(), QueueError> {
        self.provider.dead_letter_message(&receipt, &reason).await
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let timeout = self
            .config
            .default_timeout
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(30));

        match tokio::time::timeout(timeout, self.provider.health_check()).await {
            Ok(result) => result,
            Err(_) => Err(QueueError::Timeout {
                duration: self.config.default_timeout,
            }),
        }
    }

    fn provider_type(&self) -> ProviderType {
        self.provider.provider_type()
    }
}
