//! Status API — `/lb/health`, `/lb/metrics` and `/lb/status`
//!
//! Read-only views over the registry and the metrics collector.

use crate::observability::{GatewayMetrics, ServiceHealth};
use crate::service::ServiceRegistry;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Path prefix of the status API
pub const STATUS_PREFIX: &str = "/lb";

/// Features advertised by `/lb/status`
const FEATURES: &[&str] = &[
    "round_robin",
    "health_checks",
    "rate_limiting",
    "websocket_relay",
    "cors",
    "metrics_persistence",
];

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Body of `/lb/health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// `healthy` when every service has a healthy instance, else `degraded`
    pub status: &'static str,
    /// RFC 3339
    pub timestamp: String,
    pub services: BTreeMap<String, ServiceHealth>,
    pub total_requests: u64,
    pub success_rate: f64,
    pub average_response_time: f64,
}

/// Per-service entry of `/lb/status`
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub total_instances: usize,
    pub healthy_instances: usize,
    pub instances: Vec<String>,
    pub health_ratio: f64,
}

/// Gateway section of `/lb/status`
#[derive(Debug, Clone, Serialize)]
pub struct LoadBalancerInfo {
    /// Seconds since start
    pub uptime: u64,
    pub version: &'static str,
    pub features: Vec<&'static str>,
}

/// Body of `/lb/status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub services: BTreeMap<String, ServiceInfo>,
    pub load_balancer: LoadBalancerInfo,
}

// ---------------------------------------------------------------------------
// Dashboard API handler
// ---------------------------------------------------------------------------

/// Status API handler
pub struct DashboardApi {
    registry: Arc<ServiceRegistry>,
    metrics: Arc<GatewayMetrics>,
    start_time: Instant,
}

impl DashboardApi {
    pub fn new(registry: Arc<ServiceRegistry>, metrics: Arc<GatewayMetrics>) -> Self {
        Self {
            registry,
            metrics,
            start_time: Instant::now(),
        }
    }

    /// Check if a request path belongs to the status API
    pub fn matches(&self, path: &str) -> bool {
        path == STATUS_PREFIX || path.starts_with("/lb/")
    }

    /// Handle a status API request
    pub fn handle(&self, path: &str) -> Option<DashboardResponse> {
        let sub_path = path.strip_prefix(STATUS_PREFIX)?;

        match sub_path.trim_end_matches('/') {
            "/health" => Some(DashboardResponse::json(200, &self.health())),
            "/metrics" => Some(DashboardResponse::json(200, &self.metrics.snapshot())),
            "/status" => Some(DashboardResponse::json(200, &self.status())),
            _ => Some(DashboardResponse::not_found("Not found")),
        }
    }

    /// Aggregate health
    pub fn health(&self) -> HealthReport {
        let snapshot = self.metrics.snapshot();
        let services = self
            .registry
            .iter()
            .map(|(name, svc)| {
                (
                    name.clone(),
                    ServiceHealth::new(svc.total_count(), svc.healthy_count()),
                )
            })
            .collect();

        HealthReport {
            status: if self.registry.all_available() {
                "healthy"
            } else {
                "degraded"
            },
            timestamp: chrono::Utc::now().to_rfc3339(),
            services,
            total_requests: snapshot.total_requests,
            success_rate: snapshot.success_rate(),
            average_response_time: snapshot.average_response_time,
        }
    }

    /// Instance inventory and gateway info
    pub fn status(&self) -> StatusReport {
        let services = self
            .registry
            .iter()
            .map(|(name, svc)| {
                (
                    name.clone(),
                    ServiceInfo {
                        total_instances: svc.total_count(),
                        healthy_instances: svc.healthy_count(),
                        instances: svc.instances().iter().map(|i| i.address.clone()).collect(),
                        health_ratio: svc.health_ratio(),
                    },
                )
            })
            .collect();

        StatusReport {
            services,
            load_balancer: LoadBalancerInfo {
                uptime: self.start_time.elapsed().as_secs(),
                version: env!("CARGO_PKG_VERSION"),
                features: FEATURES.to_vec(),
            },
        }
    }
}

/// Response from the status API
#[derive(Debug, Clone)]
pub struct DashboardResponse {
    /// HTTP status code
    pub status: u16,
    /// Content-Type header
    pub content_type: String,
    /// Response body
    pub body: String,
}

impl DashboardResponse {
    pub(crate) fn json<T: Serialize>(status: u16, value: &T) -> Self {
        Self {
            status,
            content_type: "application/json".to_string(),
            body: serde_json::to_string(value).unwrap_or_default(),
        }
    }

    pub(crate) fn not_found(message: &str) -> Self {
        Self::json(404, &serde_json::json!({ "error": message }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use std::collections::HashMap;
    use std::time::Duration;

    fn api() -> (DashboardApi, Arc<ServiceRegistry>, Arc<GatewayMetrics>) {
        let mut configs = HashMap::new();
        configs.insert(
            "web".to_string(),
            ServiceConfig::with_instances(["http://127.0.0.1:8000", "http://127.0.0.1:8001"]),
        );
        configs.insert(
            "trading-engine".to_string(),
            ServiceConfig::with_instances(["http://127.0.0.1:9000"]),
        );
        let registry = Arc::new(ServiceRegistry::from_config(&configs).unwrap());
        let metrics = Arc::new(GatewayMetrics::new());
        (
            DashboardApi::new(registry.clone(), metrics.clone()),
            registry,
            metrics,
        )
    }

    fn body(resp: &DashboardResponse) -> serde_json::Value {
        serde_json::from_str(&resp.body).unwrap()
    }

    #[test]
    fn test_dashboard_matches() {
        let (api, _, _) = api();
        assert!(api.matches("/lb/health"));
        assert!(api.matches("/lb/status"));
        assert!(!api.matches("/lbx"));
        assert!(!api.matches("/api/lb/health"));
    }

    #[test]
    fn test_health_all_available() {
        let (api, _, metrics) = api();
        metrics.record_request(true, Duration::from_millis(100));
        metrics.record_request(false, Duration::from_millis(100));

        let resp = api.handle("/lb/health").unwrap();
        assert_eq!(resp.status, 200);
        assert!(resp.content_type.contains("json"));

        let json = body(&resp);
        assert_eq!(json["status"], "healthy");
        assert!(json["timestamp"].is_string());
        assert_eq!(json["services"]["web"]["total"], 2);
        assert_eq!(json["services"]["web"]["healthy"], 2);
        assert_eq!(json["services"]["web"]["ratio"], 1.0);
        assert_eq!(json["total_requests"], 2);
        assert_eq!(json["success_rate"], 0.5);
        assert!(json["average_response_time"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn test_health_degraded() {
        let (api, registry, _) = api();
        registry.get("trading-engine").unwrap().apply_health(&[false]);
        let json = body(&api.handle("/lb/health").unwrap());
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["services"]["trading-engine"]["healthy"], 0);
    }

    #[test]
    fn test_metrics_shape() {
        let (api, _, metrics) = api();
        metrics.set_service_health("web", ServiceHealth::new(2, 1));
        let json = body(&api.handle("/lb/metrics").unwrap());
        for key in [
            "total_requests",
            "successful_requests",
            "failed_requests",
            "average_response_time",
            "service_health",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["service_health"]["web"]["ratio"], 0.5);
    }

    #[test]
    fn test_status_inventory() {
        let (api, registry, _) = api();
        registry.get("web").unwrap().apply_health(&[true, false]);

        let json = body(&api.handle("/lb/status/").unwrap());
        let web = &json["services"]["web"];
        assert_eq!(web["total_instances"], 2);
        assert_eq!(web["healthy_instances"], 1);
        assert_eq!(web["health_ratio"], 0.5);
        assert_eq!(
            web["instances"],
            serde_json::json!(["http://127.0.0.1:8000", "http://127.0.0.1:8001"])
        );

        let lb = &json["load_balancer"];
        assert!(lb["uptime"].is_u64());
        assert_eq!(lb["version"], env!("CARGO_PKG_VERSION"));
        assert!(lb["features"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!("websocket_relay")));
    }

    #[test]
    fn test_not_found() {
        let (api, _, _) = api();
        let resp = api.handle("/lb/unknown").unwrap();
        assert_eq!(resp.status, 404);
        assert_eq!(body(&resp)["error"], "Not found");
    }

    #[test]
    fn test_no_match() {
        let (api, _, _) = api();
        assert!(api.handle("/other/path").is_none());
    }
}
