//! In-memory merchant store.

use crate::tenant::{MerchantStore, StoreError};
use crate::{MerchantId, PhoneNumber};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

/// A row of the merchants table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerchantRecord {
    pub id: String,
    pub phone_number: String,
    pub status: String,
    pub phone_number_id: Option<String>,
}

impl MerchantRecord {
    /// Active merchant with a provisioned provider phone id
    pub fn active(id: impl Into<String>, phone_number: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            phone_number_id: Some(format!("pnid-{}", id)),
            id,
            phone_number: phone_number.into(),
            status: "active".to_string(),
        }
    }
}

/// [`MerchantStore`] over a list of records, matching like the SQL lookup
#[derive(Debug, Default)]
pub struct InMemoryMerchantStore {
    records: RwLock<Vec<MerchantRecord>>,
    queries: AtomicUsize,
    unavailable: AtomicBool,
}

impl InMemoryMerchantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: MerchantRecord) {
        if let Ok(mut records) = self.records.write() {
            records.push(record);
        }
    }

    /// Number of `find_active_merchant` calls so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Make every call fail with a connection error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Connection {
                message: "store unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MerchantStore for InMemoryMerchantStore {
    async fn find_active_merchant(
        &self,
        business_phone: &PhoneNumber,
    ) -> Result<Option<MerchantId>, StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let records = self.records.read().map_err(|_| StoreError::Query {
            message: "store lock poisoned".to_string(),
        })?;

        records
            .iter()
            .find(|r| {
                r.phone_number == business_phone.as_str()
                    && r.status == "active"
                    && r.phone_number_id.is_some()
            })
            .map(|r| {
                MerchantId::new(r.id.clone()).map_err(|e| StoreError::Query {
                    message: e.to_string(),
                })
            })
            .transpose()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}

#[cfg(test)]
#[path = "memory_store_tests.rs"]
mod tests;
