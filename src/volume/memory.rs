use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{volume_key, VolumeStore, VolumeStoreError};
use crate::models::Partner;

// ============================================================================
// In-memory Volume Store
// ============================================================================
//
// Process-local counters for development and tests. Totals are not shared
// across instances and vanish on restart, which is why startup logs loudly
// when this store is selected.
//
// ============================================================================

#[derive(Default)]
pub struct InMemoryVolumeStore {
    counters: Mutex<HashMap<String, u64>>,
}

#[async_trait]
impl VolumeStore for InMemoryVolumeStore {
    async fn current(&self, partner: Partner, date: NaiveDate) -> Result<u64, VolumeStoreError> {
        let counters = self.counters.lock().await;
        Ok(counters.get(&volume_key(partner, date)).copied().unwrap_or(0))
    }

    async fn increment(&self, partner: Partner, date: NaiveDate) -> Result<u64, VolumeStoreError> {
        let mut counters = self.counters.lock().await;
        let total = counters.entry(volume_key(partner, date)).or_insert(0);
        *total += 1;
        Ok(*total)
    }
}
