//! Merchant (tenant) resolution for inbound traffic.
//!
//! A webhook delivery only names the business phone number it was sent to.
//! [`CacheAsideMerchantResolver`] maps that number to the owning merchant:
//!
//! 1. Look up `merchant:phone:{phone}` in the cache; a hit returns without
//!    touching the store.
//! 2. On a miss (or a cache failure, which is treated as a miss) query the
//!    store for an active merchant with a provisioned provider phone id,
//!    bounded by the query timeout.
//! 3. Cache a match for the configured TTL and return it.
//!
//! Concurrent misses for the same phone each query the store; there is no
//! request coalescing.

use crate::cache::KeyValueCache;
use crate::monitoring::{MetricsCollector, TenantLookupOutcome};
use crate::{ErrorCategory, MerchantId, PhoneNumber};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Default lifetime of a cached phone → merchant mapping
pub const DEFAULT_MERCHANT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Default bound on a single store query
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Cache key for a business phone number
pub fn merchant_cache_key(business_phone: &PhoneNumber) -> String {
    format!("merchant:phone:{}", business_phone.as_str())
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by the persistent merchant store
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store connection failed: {message}")]
    Connection { message: String },

    #[error("Store query failed: {message}")]
    Query { message: String },
}

impl StoreError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Reasons a business phone could not be attributed to a merchant
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("No active merchant for phone {business_phone}")]
    TenantNotFound { business_phone: String },

    #[error("Merchant store error: {0}")]
    Store(#[from] StoreError),

    #[error("Merchant lookup timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl ResolveError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TenantNotFound { .. } => false,
            Self::Store(e) => e.is_transient(),
            Self::Timeout { .. } => true,
        }
    }

    /// Get error category for monitoring
    pub fn error_category(&self) -> ErrorCategory {
        if self.is_transient() {
            ErrorCategory::Transient
        } else {
            ErrorCategory::Permanent
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Persistent source of truth for merchants
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MerchantStore: Send + Sync {
    /// Find the merchant that owns `business_phone`.
    ///
    /// Only merchants with status `active` and a configured provider phone
    /// number id match. Returns `Ok(None)` when nothing matches.
    async fn find_active_merchant(
        &self,
        business_phone: &PhoneNumber,
    ) -> Result<Option<MerchantId>, StoreError>;

    /// Check connectivity
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Maps a business phone number to its merchant
#[async_trait]
pub trait MerchantResolver: Send + Sync {
    async fn resolve(&self, business_phone: &PhoneNumber) -> Result<MerchantId, ResolveError>;
}

// ============================================================================
// Cache-aside resolver
// ============================================================================

/// [`MerchantResolver`] that consults a cache before the store.
pub struct CacheAsideMerchantResolver {
    cache: Arc<dyn KeyValueCache>,
    store: Arc<dyn MerchantStore>,
    metrics: Arc<dyn MetricsCollector>,
    cache_ttl: Duration,
    query_timeout: Duration,
}

impl CacheAsideMerchantResolver {
    pub fn new(
        cache: Arc<dyn KeyValueCache>,
        store: Arc<dyn MerchantStore>,
        metrics: Arc<dyn MetricsCollector>,
    ) -> Self {
        Self {
            cache,
            store,
            metrics,
            cache_ttl: DEFAULT_MERCHANT_CACHE_TTL,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    async fn cached(&self, key: &str) -> Option<MerchantId> {
        match self.cache.get(key).await {
            Ok(Some(value)) => match MerchantId::new(value) {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(cache_key = %key, error = %e, "Ignoring invalid cached merchant id");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Merchant cache read failed; querying store");
                self.metrics.record_error("cache", e.is_transient());
                None
            }
        }
    }
}

#[async_trait]
impl MerchantResolver for CacheAsideMerchantResolver {
    #[instrument(skip(self), fields(business_phone = %business_phone))]
    async fn resolve(&self, business_phone: &PhoneNumber) -> Result<MerchantId, ResolveError> {
        let key = merchant_cache_key(business_phone);

        if let Some(merchant_id) = self.cached(&key).await {
            debug!(merchant_id = %merchant_id, "Merchant cache hit");
            self.metrics.record_tenant_lookup(TenantLookupOutcome::CacheHit);
            return Ok(merchant_id);
        }

        self.metrics
            .record_tenant_lookup(TenantLookupOutcome::CacheMiss);
        debug!("Merchant cache miss; querying store");

        let lookup = tokio::time::timeout(
            self.query_timeout,
            self.store.find_active_merchant(business_phone),
        )
        .await;

        let merchant_id = match lookup {
            Err(_) => {
                warn!(
                    timeout_ms = self.query_timeout.as_millis() as u64,
                    "Merchant store query timed out"
                );
                self.metrics.record_tenant_lookup(TenantLookupOutcome::Error);
                return Err(ResolveError::Timeout {
                    timeout_ms: self.query_timeout.as_millis() as u64,
                });
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Merchant store query failed");
                self.metrics.record_tenant_lookup(TenantLookupOutcome::Error);
                return Err(ResolveError::Store(e));
            }
            Ok(Ok(None)) => {
                info!("No active merchant found for business phone");
                self.metrics
                    .record_tenant_lookup(TenantLookupOutcome::NotFound);
                return Err(ResolveError::TenantNotFound {
                    business_phone: business_phone.to_string(),
                });
            }
            Ok(Ok(Some(merchant_id))) => merchant_id,
        };

        if let Err(e) = self
            .cache
            .set_with_ttl(&key, merchant_id.as_str(), self.cache_ttl)
            .await
        {
            warn!(error = %e, "Failed to cache merchant id; continuing");
            self.metrics.record_error("cache", e.is_transient());
        }

        info!(merchant_id = %merchant_id, "Resolved merchant from store");
        Ok(merchant_id)
    }
}

#[cfg(test)]
#[path = "tenant_tests.rs"]
mod tests;
