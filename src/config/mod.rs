//! Configuration types for the trading gateway
//!
//! The configuration is loaded once at startup from an HCL file, then patched
//! from the environment and validated. The set of services is closed after
//! validation: no service is registered or removed at runtime.

mod rate_limit;
mod router;
mod service;

pub use rate_limit::{resolve_policies, ClassifierConfig, RateLimitCategory, RateLimitPolicy};
pub use router::{RoutingConfig, StreamConfig};
pub use service::{HealthCheckConfig, ServiceConfig};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use crate::error::{GatewayError, Result};

/// Top-level gateway configuration
///
/// # HCL Example
///
/// ```hcl
/// listen    = "0.0.0.0:8080"
/// redis_url = "redis://127.0.0.1:6379"
///
/// services "web" {
///   instances = ["http://127.0.0.1:8000"]
/// }
/// services "trading-engine" {
///   instances = ["http://127.0.0.1:9000"]
/// }
///
/// stream {
///   targets = ["ws://127.0.0.1:9000"]
/// }
///
/// rate_limits "trading_orders" {
///   limit       = 100
///   window_secs = 60
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listen address in "host:port" format
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Counter store URL; the in-process store is used when absent
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Prefix for every key written to the counter store
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Rate-limit clients by the first `X-Forwarded-For` entry instead of the
    /// peer address. Only enable behind a proxy that sets the header itself.
    #[serde(default)]
    pub trust_forwarded_for: bool,

    /// Services: name → backend pool
    #[serde(default)]
    pub services: HashMap<String, ServiceConfig>,

    /// Classification targets
    #[serde(default)]
    pub routing: RoutingConfig,

    /// WebSocket relay
    #[serde(default)]
    pub stream: StreamConfig,

    /// Active health checks
    #[serde(default)]
    pub health_check: HealthCheckConfig,

    /// Per-category overrides keyed by category name
    #[serde(default)]
    pub rate_limits: HashMap<String, RateLimitPolicy>,

    /// Path prefixes used for rate limit categories
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Metrics persistence
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_key_prefix() -> String {
    "lb".to_string()
}

/// Metrics persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between two snapshots (default: 60)
    #[serde(default = "default_persist_interval")]
    pub persist_interval_secs: u64,

    /// TTL of each stored snapshot (default: 300)
    #[serde(default = "default_snapshot_ttl")]
    pub snapshot_ttl_secs: u64,

    /// Snapshot history kept in the index (default: 3600)
    #[serde(default = "default_history")]
    pub history_secs: u64,
}

fn default_persist_interval() -> u64 {
    60
}

fn default_snapshot_ttl() -> u64 {
    300
}

fn default_history() -> u64 {
    3600
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            persist_interval_secs: default_persist_interval(),
            snapshot_ttl_secs: default_snapshot_ttl(),
            history_secs: default_history(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from an HCL file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            GatewayError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_hcl(&content)
    }

    /// Parse configuration from an HCL string
    pub fn from_hcl(content: &str) -> Result<Self> {
        hcl::from_str(content)
            .map_err(|e| GatewayError::Config(format!("Failed to parse HCL config: {}", e)))
    }

    /// Apply `REDIS_URL`, `LB_PORT` and `RATE_LIMIT_*` from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("REDIS_URL").filter(|u| !u.is_empty()) {
            self.redis_url = Some(url);
        }

        if let Some(port) = lookup("LB_PORT") {
            let port: u16 = port.trim().parse().map_err(|_| {
                GatewayError::Config(format!("LB_PORT is not a valid port: '{}'", port))
            })?;
            let host = self
                .listen
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());
            self.listen = format!("{}:{}", host, port);
        }

        for category in RateLimitCategory::ALL {
            let upper = category.as_str().to_uppercase();
            let limit = lookup(&format!("RATE_LIMIT_{}_LIMIT", upper));
            let window = lookup(&format!("RATE_LIMIT_{}_WINDOW", upper));
            if limit.is_none() && window.is_none() {
                continue;
            }

            let mut policy = self
                .rate_limits
                .get(category.as_str())
                .copied()
                .unwrap_or_else(|| category.default_policy());
            if let Some(limit) = limit {
                policy.limit = parse_env_number(&format!("RATE_LIMIT_{}_LIMIT", upper), &limit)?;
            }
            if let Some(window) = window {
                policy.window_secs =
                    parse_env_number(&format!("RATE_LIMIT_{}_WINDOW", upper), &window)?;
            }
            self.rate_limits
                .insert(category.as_str().to_string(), policy);
        }

        Ok(())
    }

    /// Parsed listen address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            GatewayError::Config(format!("Invalid listen address '{}': {}", self.listen, e))
        })
    }

    /// Effective policy for every category
    pub fn policies(&self) -> HashMap<RateLimitCategory, RateLimitPolicy> {
        resolve_policies(&self.rate_limits)
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;

        if self.services.is_empty() {
            return Err(GatewayError::Config(
                "At least one service must be configured".to_string(),
            ));
        }

        for (name, svc) in &self.services {
            if svc.instances.is_empty() {
                return Err(GatewayError::Config(format!(
                    "Service '{}' has no instances configured",
                    name
                )));
            }
            if !svc.health_path.starts_with('/') {
                return Err(GatewayError::Config(format!(
                    "Service '{}' health_path must start with '/'",
                    name
                )));
            }
        }

        for (role, target) in [
            ("trading_service", &self.routing.trading_service),
            ("default_service", &self.routing.default_service),
        ] {
            if !self.services.contains_key(target) {
                return Err(GatewayError::Config(format!(
                    "routing.{} references unknown service '{}'",
                    role, target
                )));
            }
        }

        for (name, policy) in &self.rate_limits {
            name.parse::<RateLimitCategory>()
                .map_err(GatewayError::Config)?;
            if policy.limit == 0 || policy.window_secs == 0 {
                return Err(GatewayError::Config(format!(
                    "Rate limit '{}' must have a non-zero limit and window",
                    name
                )));
            }
        }

        if self.health_check.interval_secs == 0 || self.health_check.timeout_secs == 0 {
            return Err(GatewayError::Config(
                "health_check interval and timeout must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env_number(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| GatewayError::Config(format!("{} is not a number: '{}'", key, value)))
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            redis_url: None,
            key_prefix: default_key_prefix(),
            trust_forwarded_for: false,
            services: HashMap::new(),
            routing: RoutingConfig::default(),
            stream: StreamConfig::default(),
            health_check: HealthCheckConfig::default(),
            rate_limits: HashMap::new(),
            classifier: ClassifierConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}
