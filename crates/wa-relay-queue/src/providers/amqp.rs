//! AMQP 0.9.1 (RabbitMQ) queue provider.
//!
//! Publishing goes through the default exchange with the queue name as the
//! routing key. Persistent messages are sent with `delivery_mode = 2`; the
//! provider does not enable publisher confirms, so a successful
//! `send_message` means the frame was written to the channel, not that the
//! broker stored it.
//!
//! Consumption uses one lazily created consumer per queue with manual
//! acknowledgement. Received deliveries are parked by receipt handle until
//! the caller completes, abandons or dead-letters them.

use crate::client::QueueProvider;
use crate::error::QueueError;
use crate::message::{Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage};
use crate::provider::{redact_url, AmqpConfig, ProviderType};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use futures::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// AMQP provider backed by a single connection with separate publish and
/// consume channels.
pub struct AmqpProvider {
    connection: Connection,
    publish_channel: Channel,
    consume_channel: Channel,
    consumers: Mutex<HashMap<QueueName, Consumer>>,
    pending: Mutex<HashMap<String, Acker>>,
}

impl AmqpProvider {
    /// Connect to the broker and declare the configured queues as durable.
    pub async fn connect(config: AmqpConfig) -> Result<Self, QueueError> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| QueueError::ConnectionFailed {
                message: format!("{}: {}", redact_url(&config.url), e),
            })?;

        let publish_channel = connection.create_channel().await.map_err(map_amqp_error)?;
        let consume_channel = connection.create_channel().await.map_err(map_amqp_error)?;
        consume_channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(map_amqp_error)?;

        for name in &config.declare_queues {
            let queue = QueueName::new(name.clone())?;
            declare_durable(&publish_channel, &queue).await?;
            info!(queue = %queue, "Declared durable queue");
        }

        info!(url = %redact_url(&config.url), "Connected to AMQP broker");

        Ok(Self {
            connection,
            publish_channel,
            consume_channel,
            consumers: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        })
    }

    async fn settle<F>(&self, receipt: &ReceiptHandle, action: F) -> Result<(), QueueError>
    where
        F: FnOnce(Acker) -> futures::future::BoxFuture<'static, Result<(), lapin::Error>>,
    {
        let acker = self
            .pending
            .lock()
            .await
            .remove(receipt.handle())
            .ok_or_else(|| QueueError::ReceiptNotFound {
                receipt: receipt.handle().to_string(),
            })?;

        action(acker).await.map_err(map_amqp_error)
    }
}

async fn declare_durable(channel: &Channel, queue: &QueueName) -> Result<(), QueueError> {
    channel
        .queue_declare(
            queue.as_str(),
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map(|_| ())
        .map_err(map_amqp_error)
}

fn map_amqp_error(error: lapin::Error) -> QueueError {
    match error {
        lapin::Error::IOError(e) => QueueError::ConnectionFailed {
            message: e.to_string(),
        },
        lapin::Error::InvalidConnectionState(state) => QueueError::ConnectionFailed {
            message: format!("connection state {:?}", state),
        },
        other => QueueError::Broker {
            provider: ProviderType::Amqp.to_string(),
            message: other.to_string(),
        },
    }
}

fn build_properties(message: &Message, message_id: &MessageId) -> BasicProperties {
    let mut properties = BasicProperties::default()
        .with_message_id(ShortString::from(message_id.to_string()))
        .with_timestamp(chrono::Utc::now().timestamp() as u64);

    if message.persistent {
        properties = properties.with_delivery_mode(PERSISTENT_DELIVERY_MODE);
    }
    if let Some(content_type) = &message.content_type {
        properties = properties.with_content_type(ShortString::from(content_type.clone()));
    }
    if let Some(correlation_id) = &message.correlation_id {
        properties = properties.with_correlation_id(ShortString::from(correlation_id.clone()));
    }
    if !message.attributes.is_empty() {
        let mut headers = FieldTable::default();
        for (key, value) in &message.attributes {
            headers.insert(
                ShortString::from(key.clone()),
                AMQPValue::LongString(LongString::from(value.clone())),
            );
        }
        properties = properties.with_headers(headers);
    }

    properties
}

fn read_headers(properties: &BasicProperties) -> HashMap<String, String> {
    let Some(headers) = properties.headers() else {
        return HashMap::new();
    };

    headers
        .inner()
        .iter()
        .filter_map(|(key, value)| match value {
            AMQPValue::LongString(s) => Some((
                key.as_str().to_string(),
                String::from_utf8_lossy(s.as_bytes()).into_owned(),
            )),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl QueueProvider for AmqpProvider {
    async fn send_message(
        &self,
        queue: &QueueName,
        message: &Message,
    ) -> Result<MessageId, QueueError> {
        let message_id = MessageId::new();
        let properties = build_properties(message, &message_id);

        // The returned confirm future is dropped on purpose: confirms are not enabled.
        self.publish_channel
            .basic_publish(
                "",
                queue.as_str(),
                BasicPublishOptions::default(),
                &message.body,
                properties,
            )
            .await
            .map_err(map_amqp_error)?;

        debug!(queue = %queue, message_id = %message_id, "Published message");
        Ok(message_id)
    }

    async fn receive_message(
        &self,
        queue: &QueueName,
        timeout: Duration,
    ) -> Result<Option<ReceivedMessage>, QueueError> {
        let mut consumers = self.consumers.lock().await;

        if !consumers.contains_key(queue) {
            declare_durable(&self.consume_channel, queue).await?;
            let consumer = self
                .consume_channel
                .basic_consume(
                    queue.as_str(),
                    &format!("wa-relay-{}", uuid::Uuid::new_v4()),
                    BasicConsumeOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(map_amqp_error)?;
            info!(queue = %queue, "Started AMQP consumer");
            consumers.insert(queue.clone(), consumer);
        }

        let consumer = consumers
            .get_mut(queue)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: queue.to_string(),
            })?;

        let wait = timeout.to_std().unwrap_or(std::time::Duration::ZERO);
        let delivery = match tokio::time::timeout(wait, consumer.next()).await {
            Err(_) => return Ok(None),
            Ok(None) => {
                warn!(queue = %queue, "AMQP consumer stream ended");
                consumers.remove(queue);
                return Err(QueueError::ConnectionFailed {
                    message: format!("consumer for '{}' was cancelled", queue),
                });
            }
            Ok(Some(delivery)) => delivery.map_err(map_amqp_error)?,
        };

        let handle = uuid::Uuid::new_v4().to_string();
        let properties = &delivery.properties;
        let message_id = properties
            .message_id()
            .as_ref()
            .and_then(|id| id.as_str().parse().ok())
            .unwrap_or_default();

        let received = ReceivedMessage {
            message_id,
            body: Bytes::from(delivery.data.clone()),
            attributes: read_headers(properties),
            correlation_id: properties.correlation_id().as_ref().map(|c| c.as_str().to_string()),
            content_type: properties.content_type().as_ref().map(|c| c.as_str().to_string()),
            receipt_handle: ReceiptHandle::new(handle.clone(), queue.clone(), ProviderType::Amqp),
            // Classic queues only expose the redelivered flag, not a count.
            delivery_count: if delivery.redelivered { 2 } else { 1 },
            delivered_at: chrono::Utc::now(),
        };

        self.pending.lock().await.insert(handle, delivery.acker);
        Ok(Some(received))
    }

    async fn complete_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        self.settle(receipt, |acker| {
            Box::pin(async move { acker.ack(BasicAckOptions::default()).await })
        })
        .await
    }

    async fn abandon_message(&self, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        self.settle(receipt, |acker| {
            Box::pin(async move {
                acker
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..BasicNackOptions::default()
                    })
                    .await
            })
        })
        .await
    }

    async fn dead_letter_message(
        &self,
        receipt: &ReceiptHandle,
        reason: &str,
    ) -> Result<(), QueueError> {
        debug!(receipt = %receipt.handle(), reason = %reason, "Rejecting message without requeue");
        self.settle(receipt, |acker| {
            Box::pin(async move {
                acker
                    .nack(BasicNackOptions {
                        requeue: false,
                        ..BasicNackOptions::default()
                    })
                    .await
            })
        })
        .await
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        if self.connection.status().connected() {
            Ok(())
        } else {
            Err(QueueError::ConnectionFailed {
                message: format!("connection state {:?}", self.connection.status().state()),
            })
        }
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Amqp
    }
}
