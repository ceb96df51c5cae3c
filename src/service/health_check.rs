//! Health checker — active HTTP health probes for every service
//!
//! One pass probes all instances of a service concurrently, then swaps the
//! service's healthy snapshot in one step and publishes the result to metrics.
//! A single probe decides: exactly `200 OK` is healthy, anything else
//! (other status, timeout, connection error) is not.

use super::{Service, ServiceRegistry};
use crate::config::HealthCheckConfig;
use crate::error::Result;
use crate::observability::{GatewayMetrics, ServiceHealth};
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Active health checker that periodically probes backends
pub struct HealthChecker {
    registry: Arc<ServiceRegistry>,
    metrics: Arc<GatewayMetrics>,
    client: reqwest::Client,
    interval: Duration,
}

impl HealthChecker {
    /// Create a new health checker
    pub fn new(
        registry: Arc<ServiceRegistry>,
        metrics: Arc<GatewayMetrics>,
        config: &HealthCheckConfig,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            registry,
            metrics,
            client,
            interval: Duration::from_secs(config.interval_secs.max(1)),
        })
    }

    /// Probe every service once and publish the results
    pub async fn check_all(&self) {
        let passes = self.registry.iter().map(|(_, svc)| self.check_service(svc));
        join_all(passes).await;
    }

    async fn check_service(&self, service: &Service) {
        let probes = service
            .instances()
            .iter()
            .map(|instance| self.probe(&instance.address, &service.health_path));
        let results = join_all(probes).await;

        for (instance, healthy) in service.apply_health(&results) {
            if healthy {
                tracing::info!(
                    service = service.name,
                    instance = instance.address,
                    "Instance marked healthy"
                );
            } else {
                tracing::warn!(
                    service = service.name,
                    instance = instance.address,
                    "Instance marked unhealthy"
                );
            }
        }

        self.metrics.set_service_health(
            &service.name,
            ServiceHealth::new(service.total_count(), service.healthy_count()),
        );
    }

    async fn probe(&self, address: &str, path: &str) -> bool {
        let url = format!("{}{}", address.trim_end_matches('/'), path);
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => true,
            Ok(resp) => {
                tracing::debug!(url = url, status = resp.status().as_u16(), "Health probe failed");
                false
            }
            Err(e) => {
                tracing::debug!(url = url, error = %e, "Health probe error");
                false
            }
        }
    }

    /// Run the probe loop until the shutdown signal flips to `true`
    /// (call from a spawned task)
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.check_all().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Health checker stopped");
    }
}
