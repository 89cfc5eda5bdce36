//! PostgreSQL-backed merchant store.

use crate::tenant::{MerchantStore, StoreError};
use crate::{MerchantId, PhoneNumber};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, warn};

/// Lookup of the active merchant owning a business phone number
pub const FIND_ACTIVE_MERCHANT_SQL: &str = "SELECT id::text \
     FROM merchants \
     WHERE phone_number = $1 \
       AND status = 'active' \
       AND phone_number_id IS NOT NULL \
     LIMIT 1";

/// Connection pool settings
#[derive(Debug, Clone)]
pub struct PostgresStoreConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PostgresStoreConfig {
    fn default() -> Self {
        Self {
            max_connections: 25,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(5),
            max_lifetime: Duration::from_secs(5 * 60),
        }
    }
}

/// [`MerchantStore`] reading the `merchants` table
#[derive(Debug, Clone)]
pub struct PostgresMerchantStore {
    pool: PgPool,
}

impl PostgresMerchantStore {
    /// Connect a pool to `url` and verify it with a ping
    pub async fn connect(url: &str, config: &PostgresStoreConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(url)
            .await
            .map_err(map_sqlx_error)?;

        let store = Self { pool };
        store.ping().await?;
        info!(
            max_connections = config.max_connections,
            "Connected to merchant database"
        );
        Ok(store)
    }
}

#[async_trait]
impl MerchantStore for PostgresMerchantStore {
    async fn find_active_merchant(
        &self,
        business_phone: &PhoneNumber,
    ) -> Result<Option<MerchantId>, StoreError> {
        let row: Option<String> = sqlx::query_scalar(FIND_ACTIVE_MERCHANT_SQL)
            .bind(business_phone.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(id) => MerchantId::new(id).map(Some).map_err(|e| {
                warn!(error = %e, "Merchant row has an unusable id");
                StoreError::Query {
                    message: e.to_string(),
                }
            }),
            None => Ok(None),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}

fn map_sqlx_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => StoreError::Connection {
            message: e.to_string(),
        },
        other => StoreError::Query {
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
#[path = "postgres_store_tests.rs"]
mod tests;
