use async_trait::async_trait;
use chrono::NaiveDate;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::time::timeout;

use super::{volume_key, VolumeStore, VolumeStoreError};
use crate::models::Partner;

// ============================================================================
// Redis-backed Volume Store
// ============================================================================
//
// GET/INCR over one multiplexed connection. Every call carries its own
// timeout so a stalled Redis cannot pin a queue worker; callers treat any
// error here as "counter unavailable" and fail open.
//
// ============================================================================

pub struct RedisVolumeStore {
    conn: MultiplexedConnection,
    op_timeout: Duration,
}

impl RedisVolumeStore {
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self, VolumeStoreError> {
        let client = redis::Client::open(url)?;
        let mut conn = timeout(op_timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| VolumeStoreError::Timeout(op_timeout))??;

        // Fail at startup rather than on the first order.
        let pong: String = timeout(op_timeout, redis::cmd("PING").query_async(&mut conn))
            .await
            .map_err(|_| VolumeStoreError::Timeout(op_timeout))??;
        tracing::debug!(response = %pong, "counter store connection verified");

        Ok(Self { conn, op_timeout })
    }
}

#[async_trait]
impl VolumeStore for RedisVolumeStore {
    async fn current(&self, partner: Partner, date: NaiveDate) -> Result<u64, VolumeStoreError> {
        let key = volume_key(partner, date);
        let mut conn = self.conn.clone();

        let value: Option<String> = timeout(self.op_timeout, conn.get(&key))
            .await
            .map_err(|_| VolumeStoreError::Timeout(self.op_timeout))??;

        match value {
            None => Ok(0),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| VolumeStoreError::Malformed { key, value: raw }),
        }
    }

    async fn increment(&self, partner: Partner, date: NaiveDate) -> Result<u64, VolumeStoreError> {
        let key = volume_key(partner, date);
        let mut conn = self.conn.clone();

        let total: i64 = timeout(self.op_timeout, conn.incr(&key, 1))
            .await
            .map_err(|_| VolumeStoreError::Timeout(self.op_timeout))??;

        Ok(total.max(0) as u64)
    }
}
