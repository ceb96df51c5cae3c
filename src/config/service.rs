//! Service configuration — backend pools and health checking

use serde::{Deserialize, Serialize};

/// Service configuration — a named pool of backend instances
///
/// # Example
///
/// ```hcl
/// services "web" {
///   instances   = ["http://127.0.0.1:8000", "http://127.0.0.1:8001"]
///   health_path = "/health"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Instance base URLs (e.g., "http://127.0.0.1:8000")
    #[serde(default)]
    pub instances: Vec<String>,

    /// Path probed by the health checker on every instance
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

fn default_health_path() -> String {
    "/health".to_string()
}

impl ServiceConfig {
    /// Build a service config from a list of instance URLs
    pub fn with_instances<I, S>(instances: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            instances: instances.into_iter().map(Into::into).collect(),
            health_path: default_health_path(),
        }
    }
}

/// Active health check settings, shared by all services
///
/// # Example
///
/// ```hcl
/// health_check {
///   interval_secs = 30
///   timeout_secs  = 5
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Seconds between two probe passes (default: 30)
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Per-probe timeout in seconds (default: 5)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_interval() -> u64 {
    30
}

fn default_timeout() -> u64 {
    5
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            timeout_secs: default_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_instances() {
        let svc = ServiceConfig::with_instances(["http://a:8000", "http://b:8000"]);
        assert_eq!(svc.instances.len(), 2);
        assert_eq!(svc.health_path, "/health");
    }

    #[test]
    fn test_health_check_defaults() {
        let hc = HealthCheckConfig::default();
        assert_eq!(hc.interval_secs, 30);
        assert_eq!(hc.timeout_secs, 5);
    }

    #[test]
    fn test_service_config_deserialize_defaults() {
        let svc: ServiceConfig =
            serde_json::from_str(r#"{"instances":["http://a:8000"]}"#).unwrap();
        assert_eq!(svc.health_path, "/health");
    }
}
