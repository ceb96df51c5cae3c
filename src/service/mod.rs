//! Service layer — backend pools, round-robin selection and health checking
//!
//! The registry is built once from configuration and never resized. Each
//! service owns its instances; only the health checker changes their health.

mod health_check;
mod load_balancer;

pub use health_check::HealthChecker;
pub use load_balancer::{Service, ServiceInstance};

use crate::config::ServiceConfig;
use crate::error::{GatewayError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Service registry — holds all configured backend services
pub struct ServiceRegistry {
    services: HashMap<String, Arc<Service>>,
}

impl ServiceRegistry {
    /// Build a service registry from configuration
    pub fn from_config(configs: &HashMap<String, ServiceConfig>) -> Result<Self> {
        let mut services = HashMap::new();

        for (name, config) in configs {
            if config.instances.is_empty() {
                return Err(GatewayError::Config(format!(
                    "Service '{}' has no instances",
                    name
                )));
            }
            services.insert(name.clone(), Arc::new(Service::new(name.clone(), config)));
        }

        Ok(Self { services })
    }

    /// Get a service by name
    pub fn get(&self, name: &str) -> Option<Arc<Service>> {
        self.services.get(name).cloned()
    }

    /// Next healthy instance of `service`
    pub fn select_instance(&self, service: &str) -> Result<Arc<ServiceInstance>> {
        self.services
            .get(service)
            .and_then(|svc| svc.select_instance())
            .ok_or_else(|| GatewayError::NoHealthyInstance(service.to_string()))
    }

    /// Whether every service has at least one healthy instance
    pub fn all_available(&self) -> bool {
        self.services.values().all(|svc| svc.healthy_count() > 0)
    }

    /// Number of registered services
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Iterate over all services (name → service)
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<Service>)> {
        self.services.iter()
    }
}
