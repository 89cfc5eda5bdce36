//! Infrastructure implementations of the core storage traits.
//!
//! - [`PostgresMerchantStore`] and [`RedisCache`] back production deployments.
//! - [`InMemoryMerchantStore`] (with [`crate::cache::InMemoryCache`]) serves
//!   tests and local runs.

mod memory_store;
mod postgres_store;
mod redis_cache;

pub use memory_store::{InMemoryMerchantStore, MerchantRecord};
pub use postgres_store::{PostgresMerchantStore, PostgresStoreConfig, FIND_ACTIVE_MERCHANT_SQL};
pub use redis_cache::RedisCache;
