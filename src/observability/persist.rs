//! Metrics persister — periodic snapshots into the counter store
//!
//! Each tick writes the current snapshot as JSON under
//! `{prefix}:metrics:{unix_ts}` with a TTL, indexes it by timestamp in
//! `{prefix}:metrics:index` and drops index entries past the history horizon.
//! Store failures are logged and the loop keeps going.

use super::GatewayMetrics;
use crate::config::MetricsConfig;
use crate::error::Result;
use crate::store::CounterStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Background writer of metrics snapshots
pub struct MetricsPersister {
    metrics: Arc<GatewayMetrics>,
    store: Arc<dyn CounterStore>,
    key_prefix: String,
    interval: Duration,
    ttl: Duration,
    history: Duration,
}

impl MetricsPersister {
    pub fn new(
        metrics: Arc<GatewayMetrics>,
        store: Arc<dyn CounterStore>,
        key_prefix: &str,
        config: &MetricsConfig,
    ) -> Self {
        Self {
            metrics,
            store,
            key_prefix: key_prefix.to_string(),
            interval: Duration::from_secs(config.persist_interval_secs.max(1)),
            ttl: Duration::from_secs(config.snapshot_ttl_secs),
            history: Duration::from_secs(config.history_secs),
        }
    }

    /// Key of the timestamp index
    pub fn index_key(&self) -> String {
        format!("{}:metrics:index", self.key_prefix)
    }

    /// Write one snapshot now
    pub async fn persist_once(&self) -> Result<()> {
        let timestamp = chrono::Utc::now().timestamp();
        let payload = serde_json::to_string(&self.metrics.snapshot())?;
        let key = format!("{}:metrics:{}", self.key_prefix, timestamp);

        self.store
            .persist_snapshot(
                &self.index_key(),
                &key,
                &payload,
                timestamp,
                self.ttl,
                self.history,
            )
            .await
    }

    /// Run until the shutdown signal flips to `true` (call from a spawned task)
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so the first snapshot
        // has a full interval of data behind it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.persist_once().await {
                        Ok(()) => tracing::debug!(store = self.store.name(), "Metrics snapshot persisted"),
                        Err(e) => tracing::warn!(
                            store = self.store.name(),
                            error = %e,
                            "Failed to persist metrics snapshot"
                        ),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Metrics persister stopped");
    }
}
