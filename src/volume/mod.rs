use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;

use crate::models::Partner;

mod memory;
mod redis_store;

pub use memory::InMemoryVolumeStore;
pub use redis_store::RedisVolumeStore;

// ============================================================================
// Daily Volume Counter Port
// ============================================================================
//
// Per-partner per-day order counters live in an external key-value store so
// every process instance sees the same totals. The store only needs two
// primitives: read a counter and atomically increment it. Counter keys are
// `volume:<PARTNER>:<YYYY-MM-DD>` with the date in UTC.
//
// ============================================================================

#[async_trait]
pub trait VolumeStore: Send + Sync {
    /// Orders counted against the partner on the given day. Missing
    /// counters read as zero.
    async fn current(&self, partner: Partner, date: NaiveDate) -> Result<u64, VolumeStoreError>;

    /// Atomically add one order to the partner's counter for the given day,
    /// returning the new total.
    async fn increment(&self, partner: Partner, date: NaiveDate) -> Result<u64, VolumeStoreError>;
}

pub fn volume_key(partner: Partner, date: NaiveDate) -> String {
    format!("volume:{}:{}", partner, date.format("%Y-%m-%d"))
}

#[derive(Debug, thiserror::Error)]
pub enum VolumeStoreError {
    #[error("counter operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("counter backend error: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("counter {key} holds a non-numeric value: {value}")]
    Malformed { key: String, value: String },
}
