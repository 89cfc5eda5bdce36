//! Key/value cache abstraction with per-entry expiry.
//!
//! Production uses Redis ([`crate::adapters::RedisCache`]); tests and local
//! runs use [`InMemoryCache`]. The in-memory cache measures expiry with
//! `tokio::time`, so tests running on a paused clock can step past a TTL
//! deterministically.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Errors raised by cache backends
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Cache connection failed: {message}")]
    Connection { message: String },

    #[error("Cache command failed: {message}")]
    Command { message: String },

    #[error("Cache operation timed out")]
    Timeout,
}

impl CacheError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Command { .. } => false,
            Self::Timeout => true,
        }
    }
}

/// Minimal string cache used for merchant lookups and status records
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Get a value; `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Set a value that expires after `ttl`, overwriting any previous value
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration)
        -> Result<(), CacheError>;

    /// Check connectivity
    async fn ping(&self) -> Result<(), CacheError>;
}

/// In-memory cache with lazy expiry
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time left before `key` expires, `None` when absent or expired
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.lock().ok()?;
        let (_, expires_at) = entries.get(key)?;
        expires_at
            .checked_duration_since(Instant::now())
            .filter(|remaining| !remaining.is_zero())
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|(_, exp)| *exp > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> CacheError {
        CacheError::Command {
            message: "cache lock poisoned".to_string(),
        }
    }
}

#[async_trait]
impl KeyValueCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock().map_err(|_| Self::poisoned())?;

        let expired = match entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => {
                return Ok(Some(value.clone()))
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| Self::poisoned())?;
        entries.insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.entries
            .lock()
            .map(|_| ())
            .map_err(|_| Self::poisoned())
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
