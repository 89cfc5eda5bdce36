//! Delivery status tracking.
//!
//! Every status notification (`sent`, `delivered`, `read`, `failed`) is
//! written to `status:{message_id}` with a bounded lifetime. Later
//! notifications overwrite earlier ones; no transition ordering is enforced.

use crate::cache::KeyValueCache;
use crate::monitoring::MetricsCollector;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default lifetime of a status record
pub const DEFAULT_STATUS_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache key for a message status
pub fn status_cache_key(message_id: &str) -> String {
    format!("status:{}", message_id)
}

/// Records the latest known delivery status of outbound messages
#[async_trait]
pub trait StatusTracker: Send + Sync {
    /// Store `status` for `message_id`.
    ///
    /// Returns whether the write succeeded. Failures are logged and never
    /// surfaced to the webhook caller.
    async fn record(&self, message_id: &str, status: &str) -> bool;
}

/// [`StatusTracker`] backed by a [`KeyValueCache`]
pub struct CacheStatusTracker {
    cache: Arc<dyn KeyValueCache>,
    metrics: Arc<dyn MetricsCollector>,
    ttl: Duration,
}

impl CacheStatusTracker {
    pub fn new(cache: Arc<dyn KeyValueCache>, metrics: Arc<dyn MetricsCollector>) -> Self {
        Self {
            cache,
            metrics,
            ttl: DEFAULT_STATUS_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

#[async_trait]
impl StatusTracker for CacheStatusTracker {
    async fn record(&self, message_id: &str, status: &str) -> bool {
        if message_id.is_empty() {
            warn!(status = %status, "Ignoring status update without a message id");
            self.metrics.record_status_update(false);
            return false;
        }

        let key = status_cache_key(message_id);
        match self.cache.set_with_ttl(&key, status, self.ttl).await {
            Ok(()) => {
                debug!(message_id = %message_id, status = %status, "Recorded message status");
                self.metrics.record_status_update(true);
                true
            }
            Err(e) => {
                warn!(
                    message_id = %message_id,
                    status = %status,
                    error = %e,
                    "Failed to record message status"
                );
                self.metrics.record_status_update(false);
                self.metrics.record_error("cache", e.is_transient());
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "status_tracker_tests.rs"]
mod tests;
