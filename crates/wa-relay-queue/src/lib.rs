//! # wa-relay queue runtime
//!
//! Provider-agnostic work queue client used by the relay to hand jobs to
//! downstream workers and to consume outgoing replies.
//!
//! This library provides:
//! - A [`QueueClient`] trait with explicit acknowledge / requeue / discard operations
//! - An in-memory provider for tests and local development
//! - An AMQP 0.9.1 provider (RabbitMQ) with durable queues and persistent publishing
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Message structures and receipt handles
//! - [`provider`] - Provider types and configuration
//! - [`client`] - Client traits and implementations

pub mod client;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;

pub use client::{QueueClient, QueueClientFactory, QueueProvider, StandardQueueClient};
pub use error::{ConfigurationError, QueueError, ValidationError};
pub use message::{Message, MessageId, QueueName, ReceiptHandle, ReceivedMessage};
pub use provider::{
    redact_url, AmqpConfig, InMemoryConfig, ProviderConfig, ProviderType, QueueConfig,
};
pub use providers::{AmqpProvider, InMemoryProvider};
