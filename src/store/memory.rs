//! In-process counter store with TTL expiry
//!
//! Mirrors the Redis semantics closely enough for a single gateway process:
//! a counter disappears once its window elapses, and snapshots older than the
//! history horizon are pruned from the index. Expired counters are reset when
//! next touched; untouched ones are dropped by a sweep at most once a minute.

use super::{CounterStore, WindowCount};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Minimum time between two sweeps of expired counters
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Counter {
    value: u64,
    expires_at: Instant,
}

struct Counters {
    map: HashMap<String, Counter>,
    next_sweep: Instant,
}

/// A stored metrics snapshot
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub key: String,
    pub payload: String,
    pub timestamp: i64,
    expires_at: Instant,
}

impl StoredSnapshot {
    /// Whether the snapshot's own TTL has elapsed
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory counter store
pub struct MemoryStore {
    counters: Mutex<Counters>,
    snapshots: Mutex<VecDeque<StoredSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(Counters {
                map: HashMap::new(),
                next_sweep: Instant::now() + SWEEP_INTERVAL,
            }),
            snapshots: Mutex::new(VecDeque::new()),
        }
    }

    /// Current value of a live counter
    pub fn counter(&self, key: &str) -> Option<u64> {
        let counters = self.counters.lock().unwrap();
        counters
            .map
            .get(key)
            .filter(|c| c.expires_at > Instant::now())
            .map(|c| c.value)
    }

    /// Snapshots still present in the history index, oldest first
    pub fn snapshots(&self) -> Vec<StoredSnapshot> {
        self.snapshots.lock().unwrap().iter().cloned().collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment_within(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<WindowCount> {
        let now = Instant::now();
        let mut guard = self.counters.lock().unwrap();
        let counters = &mut *guard;
        if now >= counters.next_sweep {
            counters.map.retain(|_, c| c.expires_at > now);
            counters.next_sweep = now + SWEEP_INTERVAL;
        }

        // An expired entry counts as absent and is overwritten below
        match counters.map.get_mut(key).filter(|c| c.expires_at > now) {
            Some(counter) if counter.value >= limit => Ok(WindowCount::Exceeded(counter.value)),
            Some(counter) => {
                counter.value += 1;
                Ok(WindowCount::Counted(counter.value))
            }
            None if limit == 0 => Ok(WindowCount::Exceeded(0)),
            None => {
                counters.map.insert(
                    key.to_string(),
                    Counter {
                        value: 1,
                        expires_at: now + window,
                    },
                );
                Ok(WindowCount::Counted(1))
            }
        }
    }

    async fn persist_snapshot(
        &self,
        _index: &str,
        key: &str,
        payload: &str,
        timestamp: i64,
        ttl: Duration,
        history: Duration,
    ) -> Result<()> {
        let cutoff = timestamp - history.as_secs() as i64;
        let mut snapshots = self.snapshots.lock().unwrap();
        snapshots.push_back(StoredSnapshot {
            key: key.to_string(),
            payload: payload.to_string(),
            timestamp,
            expires_at: Instant::now() + ttl,
        });
        snapshots.retain(|s| s.timestamp >= cutoff);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
