//! Provider types and configuration.

use chrono::Duration;

/// Enumeration of supported queue providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderType {
    Amqp,
    InMemory,
}

impl ProviderType {
    /// Get maximum message size for provider
    pub fn max_message_size(&self) -> usize {
        match self {
            Self::Amqp => 128 * 1024 * 1024,  // RabbitMQ default max_message_size
            Self::InMemory => 10 * 1024 * 1024, // 10MB
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Amqp => write!(f, "amqp"),
            Self::InMemory => write!(f, "in-memory"),
        }
    }
}

/// Configuration for queue client initialization
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub provider: ProviderConfig,
    pub default_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::InMemory(InMemoryConfig::default()),
            default_timeout: Duration::seconds(30),
        }
    }
}

impl QueueConfig {
    /// Build a configuration from a connection URL.
    ///
    /// `memory://` selects the in-memory provider, `amqp://` and `amqps://`
    /// select the AMQP provider. `queues` are declared durable on connect.
    pub fn from_url(url: &str, queues: Vec<String>) -> Result<Self, crate::ConfigurationError> {
        let provider = if url.starts_with("memory://") {
            ProviderConfig::InMemory(InMemoryConfig::default())
        } else if url.starts_with("amqp://") || url.starts_with("amqps://") {
            ProviderConfig::Amqp(AmqpConfig {
                url: url.to_string(),
                declare_queues: queues,
                prefetch_count: 1,
            })
        } else {
            return Err(crate::ConfigurationError::UnsupportedScheme {
                url: redact_url(url),
            });
        };

        Ok(Self {
            provider,
            ..Self::default()
        })
    }
}

/// Provider-specific configuration
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    Amqp(AmqpConfig),
    InMemory(InMemoryConfig),
}

/// AMQP (RabbitMQ) configuration
#[derive(Clone)]
pub struct AmqpConfig {
    pub url: String,
    /// Queues declared durable when the connection is established
    pub declare_queues: Vec<String>,
    /// Unacknowledged deliveries the broker may push to this consumer
    pub prefetch_count: u16,
}

impl std::fmt::Debug for AmqpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpConfig")
            .field("url", &redact_url(&self.url))
            .field("declare_queues", &self.declare_queues)
            .field("prefetch_count", &self.prefetch_count)
            .finish()
    }
}

/// In-memory provider configuration
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    pub max_queue_size: usize,
    /// How often `receive_message` re-checks an empty queue
    pub poll_interval: std::time::Duration,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10_000,
            poll_interval: std::time::Duration::from_millis(10),
        }
    }
}

/// Strip credentials from a connection URL for logging.
pub fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://<REDACTED>@{}", &url[..scheme_end], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
