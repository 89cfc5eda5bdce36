//! Dependency health checks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wa_relay_core::{KeyValueCache, MerchantStore};
use wa_relay_queue::QueueClient;

/// Health check result for individual components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub message: String,
    pub duration_ms: u64,
}

/// Overall health status
#[derive(Debug)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub checks: HashMap<String, HealthCheckResult>,
}

impl HealthStatus {
    /// Build from individual checks; healthy only when every check is
    pub fn from_checks(checks: HashMap<String, HealthCheckResult>) -> Self {
        Self {
            is_healthy: checks.values().all(|c| c.healthy),
            checks,
        }
    }

    /// Message of the first failing check, by name order
    pub fn first_failure(&self) -> Option<String> {
        let mut names: Vec<_> = self.checks.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| (name, &self.checks[name]))
            .find(|(_, c)| !c.healthy)
            .map(|(name, c)| format!("{}: {}", name, c.message))
    }
}

/// Interface for system health monitoring
#[async_trait]
pub trait HealthChecker: Send + Sync {
    async fn check_health(&self) -> HealthStatus;
}

/// Pings the cache, the queue broker and the merchant store
pub struct DependencyHealthChecker {
    cache: Arc<dyn KeyValueCache>,
    queue: Arc<dyn QueueClient>,
    store: Arc<dyn MerchantStore>,
    timeout: Duration,
}

impl DependencyHealthChecker {
    pub fn new(
        cache: Arc<dyn KeyValueCache>,
        queue: Arc<dyn QueueClient>,
        store: Arc<dyn MerchantStore>,
    ) -> Self {
        Self {
            cache,
            queue,
            store,
            timeout: Duration::from_secs(2),
        }
    }

    /// Bound on each individual check
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn timed<F, E>(&self, check: F) -> HealthCheckResult
    where
        F: Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        let start = Instant::now();
        let (healthy, message) = match tokio::time::timeout(self.timeout, check).await {
            Ok(Ok(())) => (true, "ok".to_string()),
            Ok(Err(e)) => (false, e.to_string()),
            Err(_) => (
                false,
                format!("timed out after {}ms", self.timeout.as_millis()),
            ),
        };

        HealthCheckResult {
            healthy,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}

#[async_trait]
impl HealthChecker for DependencyHealthChecker {
    async fn check_health(&self) -> HealthStatus {
        let (cache, queue, store) = tokio::join!(
            self.timed(self.cache.ping()),
            self.timed(self.queue.health_check()),
            self.timed(self.store.ping()),
        );

        let mut checks = HashMap::new();
        checks.insert("cache".to_string(), cache);
        checks.insert("queue".to_string(), queue);
        checks.insert("store".to_string(), store);
        HealthStatus::from_checks(checks)
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
