//! Process-local broker used by tests and local runs.
//!
//! This provider mirrors the broker semantics the relay depends on:
//! - FIFO delivery with an in-flight set awaiting acknowledgement
//! - Requeue to the head of the queue on abandon (like an AMQP `nack` with requeue)
//! - A dead-letter list for rejected messages that are never redelivered
//!
//! Clones share storage, so a test can keep one handle for inspection while
//! the client under test owns another.

use crate::client::QueueProvider;
use crate::error::QueueError;
use crate::message::{Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage};
use crate::provider::{InMemoryConfig, ProviderType};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Queues by name, created on first use
struct QueueStorage {
    queues: HashMap<QueueName, InMemoryQueue>,
}

impl QueueStorage {
    fn new() -> Self {
        Self {
            queues: HashMap::new(),
        }
    }

    fn get_or_create_queue(&mut self, queue_name: &QueueName) -> &mut InMemoryQueue {
        self.queues.entry(queue_name.clone()).or_default()
    }
}

#[derive(Default)]
struct InMemoryQueue {
    /// Ready messages (FIFO order)
    messages: VecDeque<StoredMessage>,
    /// Rejected messages with their reasons
    dead_letter: Vec<(StoredMessage, String)>,
    /// Delivered messages awaiting ack/nack, keyed by receipt handle
    in_flight: HashMap<String, StoredMessage>,
}

#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: Bytes,
    attributes: HashMap<String, String>,
    correlation_id: Option<String>,
    content_type: Option<String>,
    delivery_count: u32,
}

impl StoredMessage {
    fn from_message(message: &Message, message_id: MessageId) -> Self {
        Self {
            message_id,
            body: message.body.clone(),
            attributes: message.attributes.clone(),
            correlation_id: message.correlation_id.clone(),
            content_type: message.content_type.clone(),
            delivery_count: 0,
        }
    }
}

/// [`QueueProvider`] backed by shared in-process storage
#[derive(Clone)]
pub struct InMemoryProvider {
    storage: Arc<RwLock<QueueStorage>>,
    config: InMemoryConfig,
}

impl InMemoryProvider {
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            storage: Arc::new(RwLock::new(QueueStorage::new())),
            config,
        }
    }

    /// Number of messages ready for delivery
    pub fn message_count(&self, queue: &QueueName) -> usize {
        self.inspect(queue, |q| q.messages.len())
    }

    /// Number of delivered but unacknowledged messages
    pub fn in_flight_count(&self, queue: &QueueName) -> usize {
        self.inspect(queue, |q| q.in_flight.len())
    }

    /// Number of rejected messages
    pub fn dead_letter_count(&self, queue: &QueueName) -> usize {
        self.inspect(queue, |q| q.dead_letter.len())
    }

    /// Bodies of ready messages in delivery order
    pub fn peek_bodies(&self, queue: &QueueName) -> Vec<Bytes> {
        self.inspect(queue, |q| q.messages.iter().map(|m| m.body.clone()).collect())
    }

    fn inspect<T: Default>(&self, queue: &QueueName, f: impl FnOnce(&InMemoryQueue) -> T) -> T {
        self.storage
            .read()
            .ok()
            .and_then(|storage| storage.queues.get(queue).map(f))
            .unwrap_or_default()
    }

    fn poisoned() -> QueueError {
        QueueError::Broker {
            provider: ProviderType::InMemory.to_string(),
            message: "queue storage lock poisoned".to_string(),
        }
    }

    /// Pop the next ready message and move it in flight
    fn try_receive(&self, queue: &QueueName) -> Result<Option<ReceivedMessage>, QueueError> {
        let mut storage = self.storage.write().map_err(|_| Self::poisoned())?;
        let q = storage.get_or_create_queue(queue);

        let Some(mut stored) = q.messages.pop_front() else {
            return Ok(None);
        };

        stored.delivery_count += 1;
        let handle = uuid::Uuid::new_v4().to_string();
        let received = ReceivedMessage {
            message_id: stored.message_id.clone(),
            body: stored.body.clone(),
            attributes: stored.attributes.clone(),
            correlation_id: stored.correlation_id.clone(),
            content_type: stored.content_type.clone(),
            receipt_handle: ReceiptHandle::new(
                handle.clone(),
                queue.clone(),
                ProviderType::InMemory,
            ),
            delivery_count: stored.delivery_count,
            delivered_at: chrono::Utc::now(),
        };
        q.in_flight.insert(handle, stored);

        Ok(Some(received))
    }

    fn take_in_flight(&self, receipt: &ReceiptHandle) -> Result<StoredMessage, QueueError> {
        let mut storage = self.storage.write().map_err(|_| Self::poisoned())?;
        storage
            .get_or_create_queue(receipt.queue())
            .in_flight
            .remove(receipt.handle())
            .ok_or_else(|| QueueError::ReceiptNotFound {
                receipt: receipt.handle().to_string(),
            })
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl QueueProvider for InMemoryProvider {
    async fn send_message(
        &self,
        queue: &QueueName,
        message: &Message,
    ) -> Result<MessageId, QueueError> {
        let mut storage = self.storage.write().map_err(|_| Self::poisoned())?;
        let q = storage.get_or_create_queue(queue);

        if q.messages.len() >= self.config.max_queue_size {
            return Err(QueueError::QueueFull {
                queue_name: queue.to_string(),
                max_size: self.config.max_queue_size,
            });
        }

        let message_id = MessageId::new();
        q.messages
            .push_back(StoredMessage::from_message(message, message_id.clone()));

        Ok(message_id)
    }

    async fn receive_message(
        &self,
        queue: &QueueName,
        timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        let wait = timeout.to_std().unwrap_or(std::time::Duration::ZERO);
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            if let Some(received) = self.try_receive(queue)? {
                return Ok(Some(received));
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            tokio::time::sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }

    async fn complete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        self.take_in_flight(receipt).map(|_| ())
    }

    async fn abandon_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let stored = self.take_in_flight(receipt)?;
        let mut storage = self.storage.write().map_err(|_| Self::poisoned())?;
        storage
            .get_or_create_queue(receipt.queue())
            .messages
            .push_front(stored);
        Ok(())
    }

    async fn dead_letter_message(
        &self,
        receipt: &ReceiptHandle,
        reason: &str,
    ) -> Result<(), QueueError> {
        let stored = self.take_in_flight(receipt)?;
        let mut storage = self.storage.write().map_err(|_| Self::poisoned())?;
        storage
            .get_or_create_queue(receipt.queue())
            .dead_letter
            .push((stored, reason.to_string()));
        Ok(())
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        self.storage
            .read()
            .map(|_| ())
            .map_err(|_| Self::poisoned())
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}
