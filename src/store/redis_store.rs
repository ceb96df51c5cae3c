//! Redis counter store — fixed-window counters via Lua script
//!
//! The check-then-increment runs as one Lua script so a denied request never
//! bumps the counter. The connection is opened lazily and dropped after an
//! error so the next call reconnects.

use super::{CounterStore, WindowCount};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Lua script for the fixed-window check-then-increment
///
/// Arguments: KEYS[1] = counter key, ARGV[1] = limit, ARGV[2] = window (secs)
/// Returns: {1, value} when counted, {0, value} when the limit was reached
const FIXED_WINDOW_LUA: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current >= tonumber(ARGV[1]) then
    return {0, current}
end
local value = redis.call('INCR', KEYS[1])
if value == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[2])
end
return {1, value}
"#;

/// Redis-backed counter store
pub struct RedisStore {
    client: redis::Client,
    connection: Arc<Mutex<Option<MultiplexedConnection>>>,
    script: redis::Script,
}

impl RedisStore {
    /// Create a store for `redis_url`; no connection is made until first use
    pub fn new(redis_url: &str) -> Result<Self> {
        if redis_url.is_empty() {
            return Err(GatewayError::Config("redis_url cannot be empty".to_string()));
        }
        let client = redis::Client::open(redis_url).map_err(|e| {
            GatewayError::Config(format!("Invalid redis_url '{}': {}", redis_url, e))
        })?;

        Ok(Self {
            client,
            connection: Arc::new(Mutex::new(None)),
            script: redis::Script::new(FIXED_WINDOW_LUA),
        })
    }

    /// Get or create the Redis connection
    async fn get_connection(&self) -> Result<MultiplexedConnection> {
        let mut guard = self.connection.lock().await;
        if let Some(ref conn) = *guard {
            return Ok(conn.clone());
        }

        let conn = self.client.get_multiplexed_async_connection().await?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn reset_connection(&self) {
        *self.connection.lock().await = None;
    }

    async fn with_reset<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.reset_connection().await;
        }
        result
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment_within(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<WindowCount> {
        let mut conn = self.get_connection().await?;
        let result: std::result::Result<(i64, i64), redis::RedisError> = self
            .script
            .key(key)
            .arg(limit)
            .arg(window.as_secs().max(1))
            .invoke_async(&mut conn)
            .await;

        let (counted, value) = self.with_reset(result.map_err(GatewayError::from)).await?;
        let value = value.max(0) as u64;
        Ok(if counted == 1 {
            WindowCount::Counted(value)
        } else {
            WindowCount::Exceeded(value)
        })
    }

    async fn persist_snapshot(
        &self,
        index: &str,
        key: &str,
        payload: &str,
        timestamp: i64,
        ttl: Duration,
        history: Duration,
    ) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let cutoff = timestamp - history.as_secs() as i64;

        let result: std::result::Result<(), redis::RedisError> = redis::pipe()
            .atomic()
            .set_ex(key, payload, ttl.as_secs().max(1))
            .ignore()
            .zadd(index, key, timestamp)
            .ignore()
            .zrembyscore(index, "-inf", cutoff)
            .ignore()
            .query_async(&mut conn)
            .await;

        self.with_reset(result.map_err(GatewayError::from)).await
    }

    fn name(&self) -> &str {
        "redis"
    }
}
