//! Counter store — external key/counter storage with TTL
//!
//! The rate limiter keeps its fixed-window counters here and the metrics
//! persister writes its snapshots here. Redis is the production backend;
//! the in-process store is used when no Redis URL is configured and in tests.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a fixed-window increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCount {
    /// The request was counted; holds the value after the increment
    Counted(u64),
    /// The counter had already reached the limit and was left unchanged
    Exceeded(u64),
}

/// External counter store
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key` unless its current value is already `>= limit`.
    ///
    /// A missing key is created with value 1 and a TTL of `window`.
    async fn increment_within(&self, key: &str, limit: u64, window: Duration)
        -> Result<WindowCount>;

    /// Store a metrics snapshot under `key` with `ttl`, index it by `timestamp`
    /// in `index`, and drop index entries older than `timestamp - history`.
    async fn persist_snapshot(
        &self,
        index: &str,
        key: &str,
        payload: &str,
        timestamp: i64,
        ttl: Duration,
        history: Duration,
    ) -> Result<()>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Build the store selected by configuration
pub fn from_url(redis_url: Option<&str>) -> Result<Arc<dyn CounterStore>> {
    match redis_url {
        Some(url) => {
            tracing::info!(redis_url = url, "Using Redis counter store");
            Ok(Arc::new(RedisStore::new(url)?))
        }
        None => {
            tracing::warn!("No redis_url configured, counters are kept in process memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
