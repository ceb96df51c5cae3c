//! Gateway orchestrator — owns every component and background task
//!
//! `start` binds the listener and spawns the HTTP entrypoint, the health
//! checker and the metrics persister. All three watch one shutdown signal;
//! `shutdown` flips it and waits for them to finish.

use crate::config::GatewayConfig;
use crate::dashboard::DashboardApi;
use crate::entrypoint::{self, SharedState};
use crate::error::{GatewayError, Result};
use crate::middleware::{Pipeline, RateLimiter};
use crate::observability::{GatewayMetrics, MetricsPersister};
use crate::proxy::{HttpProxy, StreamRelay};
use crate::router::RouterTable;
use crate::service::{HealthChecker, ServiceRegistry};
use crate::store::{self, CounterStore};
use crate::{GatewayState, HealthStatus};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How long `shutdown` waits for a background task before aborting it
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The main Gateway — coordinates all components
pub struct Gateway {
    config: GatewayConfig,
    state: RwLock<GatewayState>,
    start_time: Instant,
    registry: Arc<ServiceRegistry>,
    metrics: Arc<GatewayMetrics>,
    store: Arc<dyn CounterStore>,
    shutdown_tx: watch::Sender<bool>,
    local_addr: RwLock<Option<SocketAddr>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Gateway {
    /// Create a new gateway from configuration, using the configured counter store
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let store = store::from_url(config.redis_url.as_deref())?;
        Self::with_store(config, store)
    }

    /// Create a new gateway with an explicit counter store
    pub fn with_store(config: GatewayConfig, store: Arc<dyn CounterStore>) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(ServiceRegistry::from_config(&config.services)?);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            state: RwLock::new(GatewayState::Created),
            start_time: Instant::now(),
            registry,
            metrics: Arc::new(GatewayMetrics::new()),
            store,
            shutdown_tx,
            local_addr: RwLock::new(None),
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Start the gateway — binds the listener and spawns background tasks
    ///
    /// On failure the gateway returns to `Created` and `start` may be retried.
    pub async fn start(&self) -> Result<()> {
        if self.state() != GatewayState::Created {
            return Err(GatewayError::Other(format!(
                "Gateway cannot start from state '{}'",
                self.state()
            )));
        }
        self.set_state(GatewayState::Starting);

        match self.launch().await {
            Ok(()) => {
                self.set_state(GatewayState::Running);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Gateway failed to start");
                self.set_state(GatewayState::Created);
                Err(e)
            }
        }
    }

    async fn launch(&self) -> Result<()> {
        let addr = self.config.listen_addr()?;

        let limiter = Arc::new(RateLimiter::new(
            self.store.clone(),
            self.config.policies(),
            self.config.classifier.clone(),
            &self.config.key_prefix,
        ));
        let http_proxy =
            HttpProxy::with_timeout(Duration::from_secs(self.config.routing.proxy_timeout_secs))?;
        let checker = HealthChecker::new(
            self.registry.clone(),
            self.metrics.clone(),
            &self.config.health_check,
        )?;
        let persister = MetricsPersister::new(
            self.metrics.clone(),
            self.store.clone(),
            &self.config.key_prefix,
            &self.config.metrics,
        );

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Other(format!("Failed to bind {}: {}", addr, e)))?;
        let bound = listener.local_addr()?;

        let shared = Arc::new(SharedState {
            pipeline: Pipeline::standard(limiter, self.metrics.clone()),
            router_table: RouterTable::from_config(&self.config.routing),
            service_registry: self.registry.clone(),
            http_proxy,
            relay: StreamRelay::new(&self.config.stream),
            dashboard: DashboardApi::new(self.registry.clone(), self.metrics.clone()),
            trust_forwarded_for: self.config.trust_forwarded_for,
        });
        tracing::debug!(stages = ?shared.pipeline.names(), "Middleware pipeline ready");

        let new_handles = vec![
            tokio::spawn(checker.run(self.shutdown_tx.subscribe())),
            tokio::spawn(persister.run(self.shutdown_tx.subscribe())),
            entrypoint::start_http_entrypoint(listener, shared, self.shutdown_tx.subscribe()),
        ];
        self.handles
            .lock()
            .unwrap()
            .extend(new_handles);
        *self.local_addr.write().unwrap() = Some(bound);

        tracing::info!(
            address = %bound,
            services = self.registry.len(),
            store = self.store.name(),
            stream_targets = self.config.stream.targets.len(),
            trust_forwarded_for = self.config.trust_forwarded_for,
            "Gateway listening"
        );
        Ok(())
    }

    /// Signal every background task to stop and wait for them
    pub async fn shutdown(&self) {
        {
            let state = self.state();
            if state == GatewayState::Stopping || state == GatewayState::Stopped {
                return;
            }
        }

        self.set_state(GatewayState::Stopping);
        tracing::info!("Gateway shutting down");

        self.shutdown_tx.send_replace(true);
        let handles: Vec<JoinHandle<()>> = self
            .handles
            .lock()
            .unwrap()
            .drain(..)
            .collect();

        for mut handle in handles {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                tracing::warn!("Background task did not stop in time, aborting");
                handle.abort();
            }
        }

        self.set_state(GatewayState::Stopped);
        tracing::info!("Gateway stopped");
    }

    /// Wait for a shutdown signal (Ctrl+C), then shut down
    pub async fn wait_for_shutdown(&self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
        self.shutdown().await;
    }

    /// Get the current gateway state
    pub fn state(&self) -> GatewayState {
        self.state.read().unwrap().clone()
    }

    /// Address the listener is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().unwrap()
    }

    /// Seconds since the gateway was created
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Lifecycle health snapshot
    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            state: self.state(),
            uptime_secs: self.uptime_secs(),
            total_requests: self.metrics.total_requests(),
            available_services: self
                .registry
                .iter()
                .filter(|(_, svc)| svc.healthy_count() > 0)
                .count(),
        }
    }

    /// Get the metrics collector
    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.metrics
    }

    /// Get the service registry
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Get the configuration
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Check if the gateway is running
    pub fn is_running(&self) -> bool {
        self.state() == GatewayState::Running
    }

    fn set_state(&self, new_state: GatewayState) {
        let mut state = self.state.write().unwrap();
        tracing::debug!(from = %*state, to = %new_state, "State transition");
        *state = new_state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::store::MemoryStore;

    fn minimal_config() -> GatewayConfig {
        let mut config = GatewayConfig {
            listen: "127.0.0.1:0".to_string(),
            ..GatewayConfig::default()
        };
        config.services.insert(
            "web".to_string(),
            ServiceConfig::with_instances(["http://127.0.0.1:1"]),
        );
        config.services.insert(
            "trading-engine".to_string(),
            ServiceConfig::with_instances(["http://127.0.0.1:1"]),
        );
        config
    }

    // --- Gateway construction ---

    #[test]
    fn test_gateway_new() {
        let gw = Gateway::new(minimal_config()).unwrap();
        assert_eq!(gw.state(), GatewayState::Created);
        assert!(!gw.is_running());
        assert!(gw.local_addr().is_none());
        assert_eq!(gw.registry().len(), 2);

        let health = gw.health();
        assert_eq!(health.state, GatewayState::Created);
        assert_eq!(health.total_requests, 0);
        assert_eq!(health.available_services, 2);
    }

    #[test]
    fn test_gateway_new_invalid_config() {
        let mut config = minimal_config();
        config.services.remove("web");
        assert!(Gateway::new(config).is_err());
    }

    #[test]
    fn test_gateway_new_invalid_redis_url() {
        let mut config = minimal_config();
        config.redis_url = Some("not a url".to_string());
        assert!(Gateway::new(config).is_err());
    }

    // --- Lifecycle ---

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let gw = Gateway::with_store(minimal_config(), Arc::new(MemoryStore::new())).unwrap();
        gw.start().await.unwrap();
        assert!(gw.is_running());
        let addr = gw.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        gw.shutdown().await;
        assert_eq!(gw.state(), GatewayState::Stopped);
        assert!(gw.handles.lock().unwrap().is_empty());

        // Listener is gone
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let gw = Gateway::with_store(minimal_config(), Arc::new(MemoryStore::new())).unwrap();
        gw.start().await.unwrap();
        assert!(gw.start().await.is_err());
        gw.shutdown().await;
    }

    #[tokio::test]
    async fn test_double_shutdown() {
        let gw = Gateway::with_store(minimal_config(), Arc::new(MemoryStore::new())).unwrap();
        gw.shutdown().await;
        gw.shutdown().await; // Should not panic
        assert_eq!(gw.state(), GatewayState::Stopped);
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = minimal_config();
        config.listen = taken.local_addr().unwrap().to_string();
        let gw = Gateway::with_store(config, Arc::new(MemoryStore::new())).unwrap();
        let err = gw.start().await.unwrap_err();
        assert!(err.to_string().contains("Failed to bind"));
        assert_eq!(gw.state(), GatewayState::Created);
        assert!(gw.local_addr().is_none());
        assert!(gw.handles.lock().unwrap().is_empty());

        // Once the port is free again the same gateway starts cleanly
        drop(taken);
        gw.start().await.unwrap();
        assert!(gw.is_running());
        gw.shutdown().await;
        assert_eq!(gw.state(), GatewayState::Stopped);
    }

    // --- State transitions ---

    #[test]
    fn test_state_transitions() {
        let gw = Gateway::new(minimal_config()).unwrap();
        gw.set_state(GatewayState::Starting);
        assert_eq!(gw.state(), GatewayState::Starting);
        gw.set_state(GatewayState::Running);
        assert!(gw.is_running());
        gw.set_state(GatewayState::Stopping);
        assert!(!gw.is_running());
    }
}
